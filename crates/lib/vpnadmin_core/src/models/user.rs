//! User (identity) domain models.
//!
//! `User` serializes straight into API responses; the password hash is
//! never written out.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Role of an identity; matches the `role` text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Manager,
    Admin,
}

impl Role {
    /// Database / claim text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Manager => "MANAGER",
            Role::Admin => "ADMIN",
        }
    }

    /// Parse the text representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Some(Role::User),
            "MANAGER" => Some(Role::Manager),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an otherwise valid credential may not be used right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    Inactive,
    NotYetValid,
    Expired,
}

/// Domain user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub manager_id: Option<i64>,
    pub is_active: bool,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub vpn_ip: Option<String>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account is locked at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Check the active flag and the validity window against `today`.
    ///
    /// `valid_from` counts from the start of its day and `valid_to` until
    /// the end of its day, so both bounds are inclusive.
    pub fn check_access(&self, today: NaiveDate) -> Result<(), AccessDenial> {
        if !self.is_active {
            return Err(AccessDenial::Inactive);
        }
        if let Some(from) = self.valid_from
            && today < from
        {
            return Err(AccessDenial::NotYetValid);
        }
        if let Some(to) = self.valid_to
            && today > to
        {
            return Err(AccessDenial::Expired);
        }
        Ok(())
    }

    /// Assigned VPN IP, treating an empty string as unassigned.
    pub fn assigned_vpn_ip(&self) -> Option<&str> {
        self.vpn_ip.as_deref().filter(|ip| !ip.is_empty())
    }
}

/// Fields required to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub manager_id: Option<i64>,
    pub is_active: bool,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub vpn_ip: Option<String>,
}

/// Which users a listing may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Every non-deleted user.
    All,
    /// The given manager and its direct non-ADMIN subordinates.
    ManagedBy(i64),
    /// Only the given user.
    Only(i64),
}
