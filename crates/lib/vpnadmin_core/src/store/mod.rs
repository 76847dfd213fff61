//! User persistence.
//!
//! Services receive an `Arc<dyn UserStore>` at construction; nothing in the
//! core reaches for a global handle. Soft-deleted users are invisible to
//! every query.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{ListScope, NewUser, User};

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Username or email uniqueness was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another non-deleted user already holds this VPN IP.
    #[error("Conflict: VPN IP {0} is already assigned")]
    VpnIpTaken(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether this is any kind of uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::VpnIpTaken(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent identity store.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a non-deleted user by id.
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;

    /// Fetch a non-deleted user by username.
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// List users visible in `scope`, ordered by id.
    async fn list(&self, scope: ListScope) -> StoreResult<Vec<User>>;

    /// Insert a user, returning the stored row.
    async fn create(&self, user: NewUser) -> StoreResult<User>;

    /// Persist the profile fields of `user`, returning the stored row.
    /// Lockout state is only written by `record_login_state`.
    async fn update(&self, user: &User) -> StoreResult<User>;

    /// Single-row write of the lockout bookkeeping fields.
    async fn record_login_state(
        &self,
        id: i64,
        failed_login_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Tombstone a user.
    async fn soft_delete(&self, id: i64) -> StoreResult<()>;

    /// `(user_id, vpn_ip)` for every non-deleted user with a non-empty VPN IP.
    async fn assigned_vpn_ips(&self) -> StoreResult<Vec<(i64, String)>>;
}
