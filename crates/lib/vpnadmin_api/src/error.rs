//! Application error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use vpnadmin_core::auth::{AuthError, TokenError};
use vpnadmin_core::store::StoreError;
use vpnadmin_core::vpn::VpnError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User account is inactive")]
    UserInactive,

    #[error("User account is not yet valid")]
    UserNotYetValid,

    #[error("User account has expired")]
    UserExpired,

    #[error("Account is locked, try again in {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: u64 },

    #[error("Too many requests, try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Vpn(VpnError),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Status and machine code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AppError::UserInactive => (StatusCode::UNAUTHORIZED, "USER_INACTIVE"),
            AppError::UserNotYetValid => (StatusCode::UNAUTHORIZED, "USER_NOT_YET_VALID"),
            AppError::UserExpired => (StatusCode::UNAUTHORIZED, "USER_EXPIRED"),
            AppError::AccountLocked { .. } => (StatusCode::TOO_MANY_REQUESTS, "ACCOUNT_LOCKED"),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Vpn(e) => match e {
                VpnError::NetworkNotConfigured => {
                    (StatusCode::SERVICE_UNAVAILABLE, "VPN_NETWORK_NOT_CONFIGURED")
                }
                VpnError::InvalidNetwork(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "VPN_INVALID_NETWORK")
                }
                VpnError::NoAvailableIp => (StatusCode::CONFLICT, "NO_AVAILABLE_IP"),
                VpnError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "INVALID_IP"),
                VpnError::OutOfRange(_) => (StatusCode::BAD_REQUEST, "IP_OUT_OF_RANGE"),
                VpnError::ReservedForServer(_) => {
                    (StatusCode::BAD_REQUEST, "IP_RESERVED_FOR_SERVER")
                }
                VpnError::AlreadyUsed(_) => (StatusCode::CONFLICT, "IP_ALREADY_USED"),
                VpnError::StoreError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            AppError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::ServiceUnavailable(m)
            | AppError::Internal(m) => m.clone(),
            other => other.to_string(),
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::AccountLocked { retry_after_secs }
            | AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, error = %self, "request failed");
        }
        let body = Json(ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.message(),
            code: code.to_string(),
        });
        let mut response = (status, body).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::VpnIpTaken(ip) => AppError::Vpn(VpnError::AlreadyUsed(ip)),
            StoreError::DbError(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Signing(msg) => AppError::Internal(msg),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::UserInactive => AppError::UserInactive,
            AuthError::UserNotYetValid => AppError::UserNotYetValid,
            AuthError::UserExpired => AppError::UserExpired,
            AuthError::AccountLocked { retry_after_secs } => AppError::AccountLocked {
                retry_after_secs: retry_after_secs.max(1) as u64,
            },
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::TokenError(e) => AppError::from(e),
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::StoreError(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<VpnError> for AppError {
    fn from(e: VpnError) -> Self {
        match e {
            VpnError::StoreError(e) => AppError::from(e),
            other => AppError::Vpn(other),
        }
    }
}
