//! Authentication request handlers.

use axum::extract::State;
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::{debug, info};
use vpnadmin_core::models::User;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthenticatedUser, PresentedToken};
use crate::models::{LoginRequest, LoginResponse, MessageResponse};
use crate::services::cookies::{clear_session_cookie, session_cookie};

/// `POST /auth/login`: authenticate with username + password.
///
/// Returns the bearer token and also sets it as the session cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<LoginResponse>)> {
    let (issued, user) = state
        .auth
        .authenticate(body.username.trim(), &body.password)
        .await?;
    state.audit.log_login(user.id);

    let cookie = session_cookie(
        &issued.token,
        state.config.session_cookie_hours,
        state.config.cookie_secure,
    );
    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token: issued.token,
            expires_in: issued.expires_in,
            user,
        }),
    ))
}

/// `POST /auth/logout`: revoke the presented token and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    Extension(PresentedToken(token)): Extension<PresentedToken>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    if let Some(blacklist) = &state.blacklist {
        let expires_at = state
            .auth
            .codec()
            .parse_unverified(&token)
            .ok()
            .and_then(|claims| claims.expires_at())
            .unwrap_or_else(|| Utc::now() + state.auth.token_ttl());
        blacklist.add(&token, expires_at).await;
        debug!(user_id = principal.id, %expires_at, "token revoked");
    }
    state.audit.log_logout(principal.id);
    info!(user_id = principal.id, "user logged out");

    Ok((
        jar.add(clear_session_cookie(state.config.cookie_secure)),
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    ))
}

/// `GET /auth/me`: the authenticated user.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
) -> AppResult<Json<User>> {
    let user = state
        .store
        .find_by_id(principal.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;
    Ok(Json(user))
}
