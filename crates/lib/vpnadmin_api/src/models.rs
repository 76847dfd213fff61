//! Request and response bodies.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use vpnadmin_core::models::{Role, User};

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP reason phrase.
    pub error: String,
    pub message: String,
    /// Machine-readable code, e.g. `INVALID_CREDENTIALS`.
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// VPN machine auth

#[derive(Debug, Deserialize)]
pub struct VpnAuthRequest {
    pub username: String,
    pub password: String,
}

/// Always sent with 200; `success` carries the outcome.
#[derive(Debug, Serialize)]
pub struct VpnAuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpn_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VpnAuthResponse {
    pub fn granted(user: &User) -> Self {
        Self {
            success: true,
            user_id: Some(user.id),
            username: Some(user.username.clone()),
            vpn_ip: user.assigned_vpn_ip().map(String::from),
            message: None,
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            success: false,
            user_id: None,
            username: None,
            vpn_ip: None,
            message: Some(message.into()),
        }
    }
}

// VPN address endpoints

#[derive(Debug, Serialize)]
pub struct NextIpResponse {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateIpRequest {
    pub ip: String,
    pub exclude_user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ValidateIpResponse {
    pub ip: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct UsedIpsResponse {
    pub ips: Vec<String>,
    pub count: usize,
}

// Users

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub manager_id: Option<i64>,
    pub is_active: Option<bool>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub vpn_ip: Option<String>,
}

/// Partial update; absent fields are left unchanged. An empty `vpn_ip`
/// releases the address.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub manager_id: Option<i64>,
    pub is_active: Option<bool>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub vpn_ip: Option<String>,
}

impl UpdateUserRequest {
    /// Whether the request touches anything beyond the self-service profile
    /// fields (email, full name).
    pub fn touches_admin_fields(&self) -> bool {
        self.role.is_some()
            || self.manager_id.is_some()
            || self.is_active.is_some()
            || self.valid_from.is_some()
            || self.valid_to.is_some()
            || self.vpn_ip.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: String,
}
