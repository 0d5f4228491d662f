//! User administration configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `USERS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `USERS_ALLOW_NON_SUPERUSER_ROLE_ASSIGNMENT` - let any user manager assign roles (default: false)
//! - `LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Sentry error sample rate, 0.0 to 1.0 (default: 1.0)

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Site-level settings consulted by the authorizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserAdminSettings {
    /// Whether users without the superuser role may assign roles.
    pub allow_non_superuser_role_assignment: bool,
}

impl UserAdminSettings {
    /// Load settings from environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a flag is not a recognised boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            allow_non_superuser_role_assignment: get_bool_env(
                "USERS_ALLOW_NON_SUPERUSER_ROLE_ASSIGNMENT",
                false,
            )?,
        })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected `text` or `json`, got `{other}`")),
        }
    }
}

/// User administration configuration.
#[derive(Clone)]
pub struct AdminConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Authorization settings
    pub settings: UserAdminSettings,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("database_url", &"[REDACTED]")
            .field("settings", &self.settings)
            .field("log_format", &self.log_format)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[SET]"))
            .field("sentry_environment", &self.sentry_environment)
            .field("sentry_sample_rate", &self.sentry_sample_rate)
            .finish()
    }
}

impl AdminConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("USERS_DATABASE_URL")?;
        let settings = UserAdminSettings::from_env()?;
        let log_format = get_env_or_default("LOG_FORMAT", "text")
            .parse()
            .map_err(|e| ConfigError::InvalidEnvVar("LOG_FORMAT".to_string(), e))?;
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .map(|s| parse_sample_rate(&s))
            .transpose()?
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            settings,
            log_format,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Read a boolean flag, falling back to `default` when unset.
fn get_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| {
        parse_bool(&value).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got `{value}`"))
        })
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_sample_rate(value: &str) -> Result<f32, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("SENTRY_SAMPLE_RATE".to_string(), reason);
    let rate: f32 = value.trim().parse().map_err(|e| invalid(format!("{e}")))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(invalid(format!("must be between 0.0 and 1.0 (got {rate})")))
    }
}
