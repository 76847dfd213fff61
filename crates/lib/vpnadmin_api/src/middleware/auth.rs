//! Authentication middleware: bearer/cookie token extraction and JWT
//! verification.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;
use vpnadmin_core::auth::Principal;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::SESSION_COOKIE;

/// Key used to store the caller's `Principal` in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

/// The raw token the request was authenticated with (needed for logout).
#[derive(Debug, Clone)]
pub struct PresentedToken(pub String);

/// Token from `Authorization: Bearer <token>`, else from the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Axum middleware: verifies the bearer token and injects
/// `AuthenticatedUser` and `PresentedToken` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing authentication token".into()))?;

    if let Some(blacklist) = &state.blacklist
        && blacklist.is_blacklisted(&token).await
    {
        debug!("rejected revoked token");
        return Err(AppError::Unauthorized("Token has been revoked".into()));
    }

    let claims = state.auth.codec().parse(&token).map_err(|e| {
        debug!(error = %e, "rejected token");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;
    let principal = Principal::from_claims(&claims)
        .ok_or_else(|| AppError::Unauthorized("Invalid token subject".into()))?;

    request.extensions_mut().insert(AuthenticatedUser(principal));
    request.extensions_mut().insert(PresentedToken(token));

    Ok(next.run(request).await)
}
