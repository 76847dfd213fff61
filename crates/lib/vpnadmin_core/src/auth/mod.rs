//! Authentication and authorization logic.
//!
//! Provides password hashing, JWT management, token revocation, the login
//! flow with lockout, and RBAC decisions shared by the API layer.

pub mod blacklist;
pub mod jwt;
pub mod password;
pub mod rbac;
pub mod service;

use thiserror::Error;

use crate::store::StoreError;

pub use blacklist::TokenBlacklist;
pub use jwt::{TokenCodec, TokenError};
pub use rbac::Principal;
pub use service::{AuthService, LockoutPolicy};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password; the two are never distinguished.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User account is inactive")]
    UserInactive,

    #[error("User account is not yet valid")]
    UserNotYetValid,

    #[error("User account has expired")]
    UserExpired,

    #[error("Account is locked, try again in {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: i64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Token error: {0}")]
    TokenError(#[from] TokenError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
