//! Credential check for the VPN server.
//!
//! Logical failures answer 200 with `success: false`; only an unreadable
//! body answers 401. VPN server scripts depend on this split.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::Utc;
use tracing::{debug, info};
use vpnadmin_core::auth::AuthError;
use vpnadmin_core::models::AccessDenial;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{VpnAuthRequest, VpnAuthResponse};

/// `POST /vpn-auth/authenticate`: verify an end user's VPN credentials.
pub async fn authenticate_handler(
    State(state): State<AppState>,
    body: Result<Json<VpnAuthRequest>, JsonRejection>,
) -> AppResult<Json<VpnAuthResponse>> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e, "malformed VPN auth request");
        AppError::Unauthorized("Invalid request body".into())
    })?;

    let user = match state
        .auth
        .authenticate_user(body.username.trim(), &body.password)
        .await
    {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            info!(username = %body.username, "VPN authentication failed");
            return Ok(Json(VpnAuthResponse::denied("Invalid credentials")));
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(denial) = user.check_access(Utc::now().date_naive()) {
        let message = match denial {
            AccessDenial::Inactive => "User account is inactive",
            AccessDenial::NotYetValid => "User account is not yet valid",
            AccessDenial::Expired => "User account has expired",
        };
        info!(user_id = user.id, ?denial, "VPN authentication denied");
        return Ok(Json(VpnAuthResponse::denied(message)));
    }

    info!(user_id = user.id, "VPN authentication succeeded");
    Ok(Json(VpnAuthResponse::granted(&user)))
}
