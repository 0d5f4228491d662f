//! `PostgreSQL` user store.
//!
//! Queries are checked at runtime (`sqlx::query_as`) so the crate builds
//! without a live database.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use cms_users_core::{Email, PluginName, Role, UserId, Username};

use super::{StoreError, UserStore};
use crate::models::{FieldErrors, NewUser, User};

const USER_COLUMNS: &str = "id, username, email, full_name, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `cms.users`.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    full_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct RoleRow {
    user_id: i64,
    role: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PluginRow {
    user_id: i64,
    name: String,
}

/// Roles and plugins grouped by user, in position order.
#[derive(Default)]
struct Assignments {
    roles: HashMap<i64, BTreeSet<Role>>,
    plugins: HashMap<i64, Vec<PluginName>>,
}

impl UserRow {
    fn into_user(self, assignments: &mut Assignments) -> Result<User, StoreError> {
        let username = Username::parse(&self.username).map_err(|e| {
            StoreError::DataCorruption(format!("invalid username for user {}: {e}", self.id))
        })?;
        let email = Email::parse(&self.email).map_err(|e| {
            StoreError::DataCorruption(format!("invalid email for user {}: {e}", self.id))
        })?;

        Ok(User {
            id: UserId::new(self.id),
            username,
            email,
            full_name: self.full_name,
            roles: assignments.roles.remove(&self.id).unwrap_or_default(),
            plugins: assignments.plugins.remove(&self.id).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Map a write error, turning unique violations into field errors.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some(constraint) if constraint.contains("email") => "email",
                _ => "username",
            };
            return StoreError::Validation(FieldErrors::single(field, "has already been taken"));
        }
    }
    StoreError::Database(err)
}

/// Replace a user's role and plugin rows inside an open transaction.
async fn replace_assignments(
    conn: &mut PgConnection,
    user_id: UserId,
    roles: &BTreeSet<Role>,
    plugins: &[PluginName],
) -> Result<(), StoreError> {
    let role_names: Vec<&str> = roles.iter().map(|role| role.as_str()).collect();
    let plugin_names: Vec<&str> = plugins.iter().map(PluginName::as_str).collect();

    sqlx::query("DELETE FROM cms.user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("INSERT INTO cms.user_roles (user_id, role) SELECT $1, UNNEST($2::text[])")
        .bind(user_id)
        .bind(role_names)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM cms.user_plugins WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r"
        INSERT INTO cms.user_plugins (user_id, name, position)
        SELECT $1, plugin.name, plugin.position
        FROM UNNEST($2::text[]) WITH ORDINALITY AS plugin(name, position)
        ",
    )
    .bind(user_id)
    .bind(plugin_names)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Store
// =============================================================================

/// User store backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load role and plugin rows for the given users.
    async fn load_assignments(&self, ids: &[i64]) -> Result<Assignments, StoreError> {
        let mut assignments = Assignments::default();
        if ids.is_empty() {
            return Ok(assignments);
        }

        let roles: Vec<RoleRow> = sqlx::query_as(
            "SELECT user_id, role FROM cms.user_roles WHERE user_id = ANY($1) ORDER BY user_id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        for row in roles {
            let role = Role::lookup(&row.role).ok_or_else(|| {
                StoreError::DataCorruption(format!(
                    "unknown role {:?} for user {}",
                    row.role, row.user_id
                ))
            })?;
            assignments.roles.entry(row.user_id).or_default().insert(role);
        }

        let plugins: Vec<PluginRow> = sqlx::query_as(
            r"
            SELECT user_id, name FROM cms.user_plugins
            WHERE user_id = ANY($1)
            ORDER BY user_id, position
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        for row in plugins {
            let name = PluginName::parse(&row.name).map_err(|e| {
                StoreError::DataCorruption(format!("invalid plugin for user {}: {e}", row.user_id))
            })?;
            assignments.plugins.entry(row.user_id).or_default().push(name);
        }

        Ok(assignments)
    }

    async fn hydrate(&self, rows: Vec<UserRow>) -> Result<Vec<User>, StoreError> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut assignments = self.load_assignments(&ids).await?;
        rows.into_iter()
            .map(|row| row.into_user(&mut assignments))
            .collect()
    }

    async fn hydrate_one(&self, row: Option<UserRow>) -> Result<Option<User>, StoreError> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

impl UserStore for PgUserStore {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM cms.users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        self.hydrate_one(row).await
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM cms.users WHERE LOWER(username) = LOWER($1)"
        ))
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM cms.users ORDER BY LOWER(username) ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: UserRow = sqlx::query_as(&format!(
            r"
            INSERT INTO cms.users (username, email, full_name)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(user.full_name.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        replace_assignments(&mut tx, UserId::new(row.id), &user.roles, &user.plugins).await?;
        tx.commit().await?;

        let mut assignments = Assignments::default();
        assignments.roles.insert(row.id, user.roles);
        assignments.plugins.insert(row.id, user.plugins);
        row.into_user(&mut assignments)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE cms.users
            SET username = $2, email = $3, full_name = $4, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(user.id)
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(user.full_name.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        replace_assignments(&mut tx, user.id, &user.roles, &user.plugins).await?;
        tx.commit().await?;

        tracing::debug!(user_id = %user.id, "user saved");
        Ok(())
    }
}
