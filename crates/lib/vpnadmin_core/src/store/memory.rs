//! In-memory user store.
//!
//! Mirrors the uniqueness rules of the Postgres schema (username, email and
//! VPN IP unique among non-deleted rows). Used by tests and local runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{StoreError, StoreResult, UserStore};
use crate::models::{ListScope, NewUser, Role, User};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    deleted: BTreeMap<i64, User>,
    next_id: i64,
}

impl Inner {
    fn check_unique(
        &self,
        id: Option<i64>,
        username: &str,
        email: &str,
        vpn_ip: Option<&str>,
    ) -> StoreResult<()> {
        for other in self.users.values().filter(|u| Some(u.id) != id) {
            if other.username == username {
                return Err(StoreError::Conflict(format!(
                    "username '{username}' already exists"
                )));
            }
            if other.email == email {
                return Err(StoreError::Conflict(format!("email '{email}' already exists")));
            }
            if let Some(ip) = vpn_ip
                && other.assigned_vpn_ip() == Some(ip)
            {
                return Err(StoreError::VpnIpTaken(ip.to_string()));
            }
        }
        Ok(())
    }
}

/// `UserStore` backed by a `BTreeMap` behind a tokio `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn list(&self, scope: ListScope) -> StoreResult<Vec<User>> {
        let inner = self.inner.read().await;
        let users = inner
            .users
            .values()
            .filter(|u| match scope {
                ListScope::All => true,
                ListScope::ManagedBy(manager) => {
                    u.id == manager || (u.manager_id == Some(manager) && u.role != Role::Admin)
                }
                ListScope::Only(id) => u.id == id,
            })
            .cloned()
            .collect();
        Ok(users)
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let vpn_ip = user.vpn_ip.filter(|ip| !ip.is_empty());
        inner.check_unique(None, &user.username, &user.email, vpn_ip.as_deref())?;

        inner.next_id += 1;
        let now = Utc::now();
        let stored = User {
            id: inner.next_id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash,
            role: user.role,
            manager_id: user.manager_id,
            is_active: user.is_active,
            valid_from: user.valid_from,
            valid_to: user.valid_to,
            vpn_ip,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, user: &User) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        // Lockout state is owned by `record_login_state`.
        let (failed_login_attempts, locked_until) = inner
            .users
            .get(&user.id)
            .map(|current| (current.failed_login_attempts, current.locked_until))
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;
        inner.check_unique(
            Some(user.id),
            &user.username,
            &user.email,
            user.assigned_vpn_ip(),
        )?;

        let mut stored = user.clone();
        stored.failed_login_attempts = failed_login_attempts;
        stored.locked_until = locked_until;
        stored.updated_at = Utc::now();
        inner.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn record_login_state(
        &self,
        id: i64,
        failed_login_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.failed_login_attempts = failed_login_attempts;
        user.locked_until = locked_until;
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        inner.deleted.insert(id, user);
        Ok(())
    }

    async fn assigned_vpn_ips(&self) -> StoreResult<Vec<(i64, String)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter_map(|u| u.assigned_vpn_ip().map(|ip| (u.id, ip.to_string())))
            .collect())
    }
}
