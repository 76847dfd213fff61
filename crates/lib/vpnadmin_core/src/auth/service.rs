//! Login flow: credential check, lockout bookkeeping, validity window and
//! token issuance.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use super::AuthError;
use super::jwt::TokenCodec;
use super::password::verify_password;
use crate::models::auth::IssuedToken;
use crate::models::{AccessDenial, User};
use crate::store::UserStore;

/// Lock an account for `duration` after `max_attempts` consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub duration: Duration,
}

impl LockoutPolicy {
    /// `None` when `max_attempts` is zero, which disables lockout.
    pub fn from_settings(max_attempts: u32, duration_minutes: i64) -> Option<Self> {
        (max_attempts > 0).then(|| Self {
            max_attempts,
            duration: Duration::minutes(duration_minutes),
        })
    }
}

impl From<AccessDenial> for AuthError {
    fn from(denial: AccessDenial) -> Self {
        match denial {
            AccessDenial::Inactive => AuthError::UserInactive,
            AccessDenial::NotYetValid => AuthError::UserNotYetValid,
            AccessDenial::Expired => AuthError::UserExpired,
        }
    }
}

/// Authenticates users against the store and issues bearer tokens.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    codec: TokenCodec,
    token_ttl: Duration,
    lockout: Option<LockoutPolicy>,
}

impl AuthService {
    /// A service without lockout: failed attempts are unbounded.
    pub fn new(store: Arc<dyn UserStore>, codec: TokenCodec, token_ttl: Duration) -> Self {
        Self {
            store,
            codec,
            token_ttl,
            lockout: None,
        }
    }

    pub fn with_lockout(mut self, policy: Option<LockoutPolicy>) -> Self {
        self.lockout = policy;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn lockout(&self) -> Option<LockoutPolicy> {
        self.lockout
    }

    /// Full interactive login. Returns the signed token and the user.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(IssuedToken, User), AuthError> {
        let mut user = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let now = Utc::now();

        // Locked accounts are rejected before the password is looked at.
        if self.lockout.is_some()
            && let Some(until) = user.locked_until
            && until > now
        {
            let remaining = (until - now).num_milliseconds();
            let retry_after_secs = ((remaining + 999) / 1000).max(1);
            warn!(user_id = user.id, retry_after_secs, "login attempt on locked account");
            return Err(AuthError::AccountLocked { retry_after_secs });
        }

        if !verify_password(password, &user.password_hash) {
            self.record_failure(&user).await?;
            return Err(AuthError::InvalidCredentials);
        }

        user.check_access(now.date_naive())?;

        if user.failed_login_attempts != 0 || user.locked_until.is_some() {
            self.store.record_login_state(user.id, 0, None).await?;
            user.failed_login_attempts = 0;
            user.locked_until = None;
        }

        let issued = self
            .codec
            .issue(user.id, &user.username, user.role, self.token_ttl)?;

        info!(user_id = user.id, username = %user.username, "user logged in");
        Ok((issued, user))
    }

    /// Raw credential check for machine callers; no lockout, validity or
    /// token handling.
    pub async fn authenticate_user(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user)
    }

    async fn record_failure(&self, user: &User) -> Result<(), AuthError> {
        let now = Utc::now();
        // A lapsed lockout starts a fresh count.
        let lapsed = user.locked_until.is_some_and(|until| until <= now);
        let attempts = if lapsed { 1 } else { user.failed_login_attempts + 1 };

        let locked_until = match self.lockout {
            Some(policy) if attempts >= policy.max_attempts as i32 => {
                warn!(
                    user_id = user.id,
                    attempts,
                    minutes = policy.duration.num_minutes(),
                    "account locked after repeated failed logins"
                );
                Some(now + policy.duration)
            }
            _ if lapsed => None,
            _ => user.locked_until,
        };

        warn!(user_id = user.id, attempts, "invalid login attempt");
        self.store
            .record_login_state(user.id, attempts, locked_until)
            .await?;
        Ok(())
    }
}
