//! Unified error handling for user administration.
//!
//! Callers get a plain [`UserAdminError`] and decide how to present it;
//! [`UserAdminError::kind`] gives them a stable, serialisable discriminant.

use serde::Serialize;
use thiserror::Error;

use cms_users_core::UserId;

use crate::db::StoreError;
use crate::models::FieldErrors;

/// Application-level error type for user administration.
#[derive(Debug, Error)]
pub enum UserAdminError {
    /// The actor may not perform this action on the target.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The update would remove the actor's own admin-panel access.
    #[error("Lockout prevented: you cannot remove your own access to the admin panel")]
    LockoutPrevented,

    /// The store rejected the record.
    #[error("Validation failed: {0}")]
    ValidationFailed(FieldErrors),

    /// Persisting the update failed; the prior roles and plugins were restored.
    #[error("Failed to save user {user_id}: {source}")]
    PersistFailure {
        /// The user being updated.
        user_id: UserId,
        /// Why the save failed.
        #[source]
        source: StoreError,
    },

    /// Restoring the prior roles and plugins failed; the record may be inconsistent.
    #[error("Failed to roll back user {user_id}: {source}")]
    RollbackFailure {
        /// The user being rolled back.
        user_id: UserId,
        /// Why the rollback save failed.
        #[source]
        source: StoreError,
    },

    /// A rollback was handed a snapshot of a different user; nothing was restored.
    #[error("Cannot roll back user {user_id} with a snapshot of user {memento_user_id}")]
    MementoMismatch {
        /// The user being rolled back.
        user_id: UserId,
        /// The user the snapshot was taken from.
        memento_user_id: UserId,
    },

    /// A role name is not registered.
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// A plugin name is not registered.
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// The target user does not exist.
    #[error("User not found: {0}")]
    NotFound(UserId),

    /// A store read failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Discriminant of a [`UserAdminError`], safe to hand to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    LockoutPrevented,
    ValidationFailed,
    PersistFailure,
    RollbackFailure,
    MementoMismatch,
    UnknownRole,
    UnknownPlugin,
    NotFound,
    Store,
}

impl UserAdminError {
    /// The error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::LockoutPrevented => ErrorKind::LockoutPrevented,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::PersistFailure { .. } => ErrorKind::PersistFailure,
            Self::RollbackFailure { .. } => ErrorKind::RollbackFailure,
            Self::MementoMismatch { .. } => ErrorKind::MementoMismatch,
            Self::UnknownRole(_) => ErrorKind::UnknownRole,
            Self::UnknownPlugin(_) => ErrorKind::UnknownPlugin,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Whether the error left persisted state unknown.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RollbackFailure { .. } | Self::MementoMismatch { .. }
        )
    }

    /// Field errors, for validation failures.
    #[must_use]
    pub const fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Log a rollback failure and capture it in Sentry.
///
/// Kept separate from ordinary error logging: a failed rollback means the
/// stored roles and plugins may no longer match either the old or new state.
pub fn report_rollback_failure(error: &UserAdminError) {
    let event_id = sentry::capture_error(error);
    tracing::error!(
        error = %error,
        sentry_event_id = %event_id,
        "User rollback failed; stored roles and plugins may be inconsistent"
    );
}

/// Set the Sentry user context to the acting user.
pub fn set_sentry_actor(actor_id: UserId, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(actor_id.to_string()),
            username: Some(username.to_owned()),
            ..Default::default()
        }));
    });
}
