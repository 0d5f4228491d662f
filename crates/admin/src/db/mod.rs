//! Persistence for user accounts.
//!
//! # Database schema: `cms`
//!
//! ## Tables
//!
//! - `users` - Account identity (username, email, full name)
//! - `user_roles` - Granted roles, one row per (user, role)
//! - `user_plugins` - Granted plugins, ordered by `position`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/admin/migrations/` and run via:
//! ```bash
//! cargo run -p cms-users-cli -- migrate
//! ```
//!
//! # Stores
//!
//! [`UserStore`] is the seam the authorizer and service persist through.
//! [`PgUserStore`] is the production implementation; [`MemoryUserStore`]
//! keeps everything in process and applies the same validation rules.

pub mod memory;
pub mod users;

use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use cms_users_core::{UserId, Username};

use crate::models::{FieldErrors, NewUser, User};

pub use memory::MemoryUserStore;
pub use users::PgUserStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record failed validation (e.g. a duplicate username).
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The record to update does not exist.
    #[error("not found")]
    NotFound,

    /// The store cannot take writes right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Load and persist users.
///
/// `save` writes the user row together with its role and plugin assignments;
/// implementations make that write all-or-nothing where they can.
pub trait UserStore: Send + Sync {
    /// Fetch a user by ID.
    fn find(&self, id: UserId) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Fetch a user by username, ignoring case.
    fn find_by_username(
        &self,
        username: &Username,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// All users, ordered by username.
    fn list(&self) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;

    /// Insert a new user together with its roles and plugins.
    fn insert(&self, user: NewUser) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Persist the user's profile, roles and plugins.
    fn save(&self, user: &User) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Create a `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
