//! Shared-secret guard for calls from the VPN server.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::AppState;
use crate::error::AppError;

/// Header carrying the shared VPN token.
pub const VPN_TOKEN_HEADER: &str = "x-vpn-token";

/// Axum middleware: compares `X-VPN-Token` byte-for-byte with the configured
/// secret. 503 when no secret is configured, 401 on absence or mismatch.
pub async fn require_vpn_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .config
        .vpn_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::ServiceUnavailable("VPN integration is not configured".into()))?;

    let presented = request
        .headers()
        .get(VPN_TOKEN_HEADER)
        .map(|v| v.as_bytes())
        .ok_or_else(|| AppError::Unauthorized("Missing VPN token".into()))?;

    if presented != expected.as_bytes() {
        warn!("rejected VPN call with wrong token");
        return Err(AppError::Unauthorized("Invalid VPN token".into()));
    }
    Ok(next.run(request).await)
}
