//! User management handlers.
//!
//! Route guards only establish who the caller is (and, for the collection
//! routes, that it is ADMIN or MANAGER). Ownership is decided here against
//! the stored target on every request.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde_json::json;
use tracing::{debug, info};
use vpnadmin_core::auth::Principal;
use vpnadmin_core::auth::password::{hash_password_with_cost, verify_password};
use vpnadmin_core::models::{ListScope, NewUser, Role, User};
use vpnadmin_core::store::StoreError;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{CreateUserRequest, MessageResponse, UpdatePasswordRequest, UpdateUserRequest};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// How often an auto-assigned VPN IP is re-picked after losing a race.
pub const ALLOCATION_ATTEMPTS: usize = 5;

/// `GET /users`: ADMIN sees everyone, MANAGER itself and its subordinates.
pub async fn list_users_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<User>>> {
    let scope = match principal.role {
        Role::Admin => ListScope::All,
        Role::Manager => ListScope::ManagedBy(principal.id),
        Role::User => ListScope::Only(principal.id),
    };
    Ok(Json(state.store.list(scope).await?))
}

/// `POST /users`
pub async fn create_user_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let username = body.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::Validation("username is required".into()));
    }
    let email = normalize_email(&body.email)?;
    validate_password(&body.password)?;
    validate_window(body.valid_from, body.valid_to)?;

    let role = body.role.unwrap_or(Role::User);
    principal.ensure_can_assign_role(role)?;
    let manager_id = principal.manager_for_new_user(body.manager_id);
    if principal.is_admin()
        && let Some(id) = manager_id
    {
        ensure_user_exists(&state, id).await?;
    }

    let mut new_user = NewUser {
        username,
        email,
        full_name: normalize_name(body.full_name),
        password_hash: hash_password_with_cost(&body.password, state.config.bcrypt_cost)?,
        role,
        manager_id,
        is_active: body.is_active.unwrap_or(true),
        valid_from: body.valid_from,
        valid_to: body.valid_to,
        vpn_ip: None,
    };

    let requested_ip = body
        .vpn_ip
        .as_deref()
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    let user = match requested_ip {
        Some(ip) => {
            if state.allocator.is_configured() {
                state.allocator.validate(ip, None).await?;
            }
            new_user.vpn_ip = Some(ip.to_string());
            state.store.create(new_user).await?
        }
        None if state.allocator.is_configured() => create_with_next_ip(&state, new_user).await?,
        None => state.store.create(new_user).await?,
    };

    state.audit.log_create(
        principal.id,
        "user",
        user.id,
        json!({ "username": user.username, "role": user.role, "vpn_ip": user.vpn_ip }),
    );
    info!(user_id = user.id, created_by = principal.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> AppResult<Json<User>> {
    let user = load_manageable(&state, &principal, id).await?;
    Ok(Json(user))
}

/// `PUT /users/{id}`: partial profile/administrative update.
pub async fn update_user_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    // Caller-only checks run before the target is loaded.
    if principal.role == Role::User && body.touches_admin_fields() {
        return Err(AppError::Forbidden(
            "you may only change your email and full name".into(),
        ));
    }
    if let Some(role) = body.role {
        principal.ensure_can_assign_role(role)?;
    }

    let mut user = load_manageable(&state, &principal, id).await?;

    let mut changed = Vec::new();

    if let Some(email) = &body.email {
        user.email = normalize_email(email)?;
        changed.push("email");
    }
    if body.full_name.is_some() {
        user.full_name = normalize_name(body.full_name);
        changed.push("full_name");
    }
    if let Some(role) = body.role {
        user.role = role;
        changed.push("role");
    }
    if let Some(manager_id) = body.manager_id {
        if manager_id == user.id {
            return Err(AppError::Validation("a user cannot be its own manager".into()));
        }
        match principal.role {
            Role::Manager if manager_id != principal.id => {
                return Err(AppError::Forbidden(
                    "managers cannot move users to another manager".into(),
                ));
            }
            Role::Admin => ensure_user_exists(&state, manager_id).await?,
            _ => {}
        }
        user.manager_id = Some(manager_id);
        changed.push("manager_id");
    }
    if let Some(active) = body.is_active {
        if !active && user.id == principal.id {
            return Err(AppError::Validation("you cannot deactivate yourself".into()));
        }
        user.is_active = active;
        changed.push("is_active");
    }
    if body.valid_from.is_some() {
        user.valid_from = body.valid_from;
        changed.push("valid_from");
    }
    if body.valid_to.is_some() {
        user.valid_to = body.valid_to;
        changed.push("valid_to");
    }
    validate_window(user.valid_from, user.valid_to)?;

    if let Some(ip) = body.vpn_ip.as_deref().map(str::trim) {
        if ip.is_empty() {
            user.vpn_ip = None;
        } else {
            if state.allocator.is_configured() {
                state.allocator.validate(ip, Some(user.id)).await?;
            }
            user.vpn_ip = Some(ip.to_string());
        }
        changed.push("vpn_ip");
    }

    let updated = state.store.update(&user).await?;
    state
        .audit
        .log_update(principal.id, "user", updated.id, json!({ "fields": changed }));
    Ok(Json(updated))
}

/// `PUT /users/{id}/password`: changing one's own password requires the
/// current one.
pub async fn update_password_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let mut user = load_manageable(&state, &principal, id).await?;
    validate_password(&body.new_password)?;

    if user.id == principal.id {
        let current = body
            .current_password
            .as_deref()
            .ok_or_else(|| AppError::Validation("current_password is required".into()))?;
        if !verify_password(current, &user.password_hash) {
            return Err(AppError::Validation("current password is incorrect".into()));
        }
    }

    user.password_hash = hash_password_with_cost(&body.new_password, state.config.bcrypt_cost)?;
    state.store.update(&user).await?;
    state
        .audit
        .log_update(principal.id, "user", user.id, json!({ "fields": ["password"] }));

    Ok(Json(MessageResponse {
        message: "Password updated".into(),
    }))
}

/// `DELETE /users/{id}`: ADMIN only; soft delete.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(principal)): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !principal.is_admin() {
        return Err(AppError::Forbidden(
            "only administrators can delete users".into(),
        ));
    }
    if id == principal.id {
        return Err(AppError::Validation("you cannot delete your own account".into()));
    }
    state.store.soft_delete(id).await?;
    state.audit.log_delete(principal.id, "user", id);
    info!(user_id = id, deleted_by = principal.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn load_manageable(state: &AppState, principal: &Principal, id: i64) -> AppResult<User> {
    let user = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    principal.ensure_can_manage(&user)?;
    Ok(user)
}

async fn ensure_user_exists(state: &AppState, id: i64) -> AppResult<()> {
    match state.store.find_by_id(id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::Validation(format!("manager {id} does not exist"))),
    }
}

/// Insert with the next free address, re-picking when a concurrent request
/// claimed it first.
async fn create_with_next_ip(state: &AppState, new_user: NewUser) -> AppResult<User> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let ip = state.allocator.next_available().await?;
        let mut candidate = new_user.clone();
        candidate.vpn_ip = Some(ip.to_string());
        match state.store.create(candidate).await {
            Err(StoreError::VpnIpTaken(taken)) if attempt < ALLOCATION_ATTEMPTS => {
                debug!(ip = %taken, attempt, "allocated VPN IP was taken, retrying");
            }
            result => return result.map_err(AppError::from),
        }
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
        _ => Err(AppError::Validation("a valid email is required".into())),
    }
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_window(from: Option<NaiveDate>, to: Option<NaiveDate>) -> AppResult<()> {
    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        return Err(AppError::Validation(
            "valid_from must not be after valid_to".into(),
        ));
    }
    Ok(())
}
