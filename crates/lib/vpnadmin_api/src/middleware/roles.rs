//! Role guard for route groups.
//!
//! Runs after `require_auth`; ownership checks stay in the handlers.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use vpnadmin_core::models::Role;

use super::auth::AuthenticatedUser;
use crate::error::AppError;

/// Roles admitted by `require_role`.
#[derive(Debug, Clone, Copy)]
pub struct AllowedRoles(pub &'static [Role]);

/// Axum middleware: rejects with 403 unless the caller's role is allowed.
pub async fn require_role(
    State(AllowedRoles(allowed)): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let AuthenticatedUser(principal) = request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))?;

    if let Err(e) = principal.require_role(allowed) {
        debug!(user_id = principal.id, role = %principal.role, "role check failed");
        return Err(e.into());
    }
    Ok(next.run(request).await)
}
