//! Role-based access decisions.
//!
//! ADMIN manages everyone, MANAGER manages itself and its direct
//! subordinates, USER manages only itself. All decisions are made from the
//! authenticated principal and the stored target, never from client input.

use serde::Serialize;

use super::AuthError;
use crate::models::auth::TokenClaims;
use crate::models::{Role, User};

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl Principal {
    /// Build a principal from verified claims.
    pub fn from_claims(claims: &TokenClaims) -> Option<Self> {
        Some(Self {
            id: claims.user_id()?,
            username: claims.username.clone(),
            role: claims.role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the role is one of `allowed`.
    pub fn has_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }

    /// Fail with `Forbidden` unless the role is one of `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AuthError> {
        if self.has_role(allowed) {
            Ok(())
        } else {
            Err(AuthError::Forbidden("insufficient role".into()))
        }
    }

    /// Ownership check for a resource owned by `owner_id`, whose owner
    /// holds `owner_role` and reports to `owner_manager_id`. A MANAGER never
    /// reaches an ADMIN, even one filed under it.
    pub fn can_act_on(&self, owner_id: i64, owner_role: Role, owner_manager_id: Option<i64>) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Manager => {
                owner_id == self.id
                    || (owner_manager_id == Some(self.id) && owner_role != Role::Admin)
            }
            Role::User => owner_id == self.id,
        }
    }

    /// Whether this principal may act on `target`.
    pub fn can_manage(&self, target: &User) -> bool {
        self.can_act_on(target.id, target.role, target.manager_id)
    }

    pub fn ensure_can_manage(&self, target: &User) -> Result<(), AuthError> {
        if self.can_manage(target) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(
                "you do not have permission to access this user".into(),
            ))
        }
    }

    /// Whether this principal may give `role` to an identity it creates or
    /// updates. Only ADMIN may hand out ADMIN; USER hands out nothing.
    pub fn ensure_can_assign_role(&self, role: Role) -> Result<(), AuthError> {
        let allowed = match self.role {
            Role::Admin => true,
            Role::Manager => role != Role::Admin,
            Role::User => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!("you cannot assign the {role} role")))
        }
    }

    /// Manager to record on an identity created by this principal.
    ///
    /// Managers always own what they create; admins may pick any manager.
    pub fn manager_for_new_user(&self, requested: Option<i64>) -> Option<i64> {
        match self.role {
            Role::Manager => Some(self.id),
            _ => requested,
        }
    }
}
