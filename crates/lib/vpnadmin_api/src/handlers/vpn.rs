//! VPN address endpoints for administrators and managers.

use axum::Json;
use axum::extract::State;
use vpnadmin_core::vpn::{NetworkInfo, VpnError};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{NextIpResponse, UsedIpsResponse, ValidateIpRequest, ValidateIpResponse};

/// `GET /vpn/next-ip`
pub async fn next_ip_handler(State(state): State<AppState>) -> AppResult<Json<NextIpResponse>> {
    let ip = state.allocator.next_available().await?;
    Ok(Json(NextIpResponse { ip: ip.to_string() }))
}

/// `GET /vpn/network-info`
pub async fn network_info_handler(State(state): State<AppState>) -> AppResult<Json<NetworkInfo>> {
    Ok(Json(state.allocator.network_info().await?))
}

/// `POST /vpn/validate-ip`: address-level problems come back as
/// `valid: false`; configuration and store failures are errors.
pub async fn validate_ip_handler(
    State(state): State<AppState>,
    Json(body): Json<ValidateIpRequest>,
) -> AppResult<Json<ValidateIpResponse>> {
    let ip = body.ip.trim().to_string();
    match state.allocator.validate(&ip, body.exclude_user_id).await {
        Ok(()) => Ok(Json(ValidateIpResponse {
            ip,
            valid: true,
            message: None,
            code: None,
        })),
        Err(
            e @ (VpnError::InvalidAddress(_)
            | VpnError::OutOfRange(_)
            | VpnError::ReservedForServer(_)
            | VpnError::AlreadyUsed(_)),
        ) => {
            let message = e.to_string();
            let (_, code) = AppError::Vpn(e).status_and_code();
            Ok(Json(ValidateIpResponse {
                ip,
                valid: false,
                message: Some(message),
                code: Some(code),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

/// `GET /vpn/used-ips`
pub async fn used_ips_handler(State(state): State<AppState>) -> AppResult<Json<UsedIpsResponse>> {
    let ips = state.allocator.used_ips().await?;
    Ok(Json(UsedIpsResponse {
        count: ips.len(),
        ips,
    }))
}
