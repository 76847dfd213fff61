//! Postgres-backed user store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use super::{StoreError, StoreResult, UserStore};
use crate::models::{ListScope, NewUser, Role, User};

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, role, manager_id, \
     is_active, valid_from, valid_to, vpn_ip, failed_login_attempts, locked_until, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    full_name: Option<String>,
    password_hash: String,
    role: String,
    manager_id: Option<i64>,
    is_active: bool,
    valid_from: Option<NaiveDate>,
    valid_to: Option<NaiveDate>,
    vpn_ip: Option<String>,
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role).ok_or_else(|| {
            StoreError::DbError(sqlx::Error::Decode(
                format!("unknown role '{}' for user {}", row.role, row.id).into(),
            ))
        })?;
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            role,
            manager_id: row.manager_id,
            is_active: row.is_active,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            vpn_ip: row.vpn_ip,
            failed_login_attempts: row.failed_login_attempts,
            locked_until: row.locked_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Map unique-index violations onto the matching conflict variant.
fn map_write_error(e: sqlx::Error, vpn_ip: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return match db.constraint() {
            Some("users_vpn_ip_active_key") => {
                StoreError::VpnIpTaken(vpn_ip.unwrap_or_default().to_string())
            }
            Some("users_username_active_key") => {
                StoreError::Conflict("username already exists".into())
            }
            Some("users_email_active_key") => StoreError::Conflict("email already exists".into()),
            _ => StoreError::Conflict("duplicate value".into()),
        };
    }
    StoreError::DbError(e)
}

/// `UserStore` over a Postgres pool.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn list(&self, scope: ListScope) -> StoreResult<Vec<User>> {
        let base = format!("SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL");
        let rows = match scope {
            ListScope::All => {
                sqlx::query_as::<_, UserRow>(&format!("{base} ORDER BY id"))
                    .fetch_all(&self.pool)
                    .await?
            }
            ListScope::ManagedBy(manager) => {
                sqlx::query_as::<_, UserRow>(&format!(
                    "{base} AND (id = $1 OR (manager_id = $1 AND role <> 'ADMIN')) ORDER BY id"
                ))
                .bind(manager)
                .fetch_all(&self.pool)
                .await?
            }
            ListScope::Only(id) => {
                sqlx::query_as::<_, UserRow>(&format!("{base} AND id = $1 ORDER BY id"))
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(User::try_from).collect()
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (username, email, full_name, password_hash, role, manager_id, \
             is_active, valid_from, valid_to, vpn_ip) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULLIF($10, '')) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.manager_id)
            .bind(user.is_active)
            .bind(user.valid_from)
            .bind(user.valid_to)
            .bind(&user.vpn_ip)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, user.vpn_ip.as_deref()))?;
        User::try_from(row)
    }

    async fn update(&self, user: &User) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users SET username = $2, email = $3, full_name = $4, password_hash = $5, \
             role = $6, manager_id = $7, is_active = $8, valid_from = $9, valid_to = $10, \
             vpn_ip = NULLIF($11, ''), updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.manager_id)
            .bind(user.is_active)
            .bind(user.valid_from)
            .bind(user.valid_to)
            .bind(&user.vpn_ip)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, user.vpn_ip.as_deref()))?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;
        User::try_from(row)
    }

    async fn record_login_state(
        &self,
        id: i64,
        failed_login_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET failed_login_attempts = $2, locked_until = $3 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(failed_login_attempts)
        .bind(locked_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn assigned_vpn_ips(&self) -> StoreResult<Vec<(i64, String)>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, vpn_ip FROM users \
             WHERE deleted_at IS NULL AND vpn_ip IS NOT NULL AND vpn_ip <> ''",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
