//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! cms-users migrate
//! ```
//!
//! # Migration Files
//!
//! Stored in `crates/admin/migrations/` and embedded at compile time.

use sqlx::PgPool;

use super::CliError;

/// Run the user administration migrations.
///
/// # Errors
///
/// Returns `CliError::Migration` if a migration fails to apply.
pub async fn run(pool: &PgPool) -> Result<(), CliError> {
    tracing::info!("Running user administration migrations...");
    sqlx::migrate!("../admin/migrations").run(pool).await?;
    tracing::info!("Migrations complete");
    Ok(())
}
