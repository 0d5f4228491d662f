//! CLI subcommand implementations.

pub mod migrate;
pub mod users;

use thiserror::Error;

use cms_users_admin::UserAdminError;
use cms_users_admin::config::ConfigError;
use cms_users_admin::db::StoreError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The user administration layer rejected the command.
    #[error("{0}")]
    Admin(#[from] UserAdminError),

    /// A direct store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// `--as` named a user that does not exist.
    #[error("No user named {0}")]
    UnknownActor(String),

    /// A command argument was rejected.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Output could not be serialized.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Whether the error left stored data in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Admin(e) if e.is_fatal())
    }
}
