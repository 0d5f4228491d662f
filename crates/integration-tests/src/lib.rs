//! Integration tests for CMS user administration.
//!
//! # Running Tests
//!
//! ```bash
//! # Service-level tests (in-memory store, no services needed)
//! cargo test -p cms-users-integration-tests
//!
//! # PostgreSQL store tests
//! createdb cms_users_test
//! USERS_TEST_DATABASE_URL=postgres://localhost/cms_users_test cargo test -p cms-users-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `user_updates` - Update flow: authorization, lockout, rollback
//! - `user_creation` - Create flow: role fallback, invitations
//! - `pg_user_store` - `PgUserStore` against a real database
//!
//! This library holds the fixtures those tests share.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::DateTime;

use cms_users_admin::db::{MemoryUserStore, StoreError, UserStore};
use cms_users_admin::models::{FieldErrors, NewUser, User};
use cms_users_admin::services::{InvitationError, InvitationSender};
use cms_users_core::{Email, PluginName, Role, UserId, Username};

/// In-memory store whose next `insert` or `save` calls can be made to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryUserStore,
    failing_inserts: AtomicUsize,
    failing_saves: AtomicUsize,
    saves: AtomicUsize,
}

/// Take one injected failure from `counter`, if any are left.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl FailingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` inserts fail with `StoreError::Unavailable`.
    pub fn fail_next_inserts(&self, count: usize) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` saves fail with `StoreError::Unavailable`.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Number of `save` calls seen, failed ones included.
    #[must_use]
    pub fn save_calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The wrapped store, bypassing injected failures.
    #[must_use]
    pub const fn inner(&self) -> &MemoryUserStore {
        &self.inner
    }
}

impl UserStore for FailingStore {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.find(id).await
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, StoreError> {
        self.inner.find_by_username(username).await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        self.inner.list().await
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        if take_failure(&self.failing_inserts) {
            return Err(StoreError::Unavailable("injected insert failure".to_owned()));
        }
        self.inner.insert(user).await
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_saves) {
            return Err(StoreError::Unavailable("injected save failure".to_owned()));
        }
        self.inner.save(user).await
    }
}

/// Invitation sender that remembers who was invited and by whom.
#[derive(Debug, Default)]
pub struct RecordingInvitations {
    sent: Mutex<Vec<(UserId, String)>>,
    fail: bool,
}

impl RecordingInvitations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose every delivery fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(invitee, inviter)` pairs in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InvitationSender for RecordingInvitations {
    async fn send_invitation(&self, invitee: &User, inviter: &str) -> Result<(), InvitationError> {
        if self.fail {
            return Err(InvitationError::Delivery("mail relay offline".to_owned()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((invitee.id, inviter.to_owned()));
        Ok(())
    }
}

/// Insert a user with the given roles and plugins, bypassing the service.
///
/// # Errors
///
/// Returns `StoreError::Validation` for an invalid username, email or plugin
/// name, or whatever the store returns.
pub async fn seed_user<S: UserStore>(
    store: &S,
    username: &str,
    roles: &[Role],
    plugins: &[&str],
) -> Result<User, StoreError> {
    let invalid = |field: &str, e: &dyn std::fmt::Display| {
        StoreError::Validation(FieldErrors::single(field, &e.to_string()))
    };

    let plugins: Vec<PluginName> = plugins
        .iter()
        .map(|name| PluginName::parse(name).map_err(|e| invalid("plugins", &e)))
        .collect::<Result<_, _>>()?;
    let new_user = NewUser::new(
        Username::parse(username).map_err(|e| invalid("username", &e))?,
        Email::parse(&format!("{}@cms.test", username.replace(' ', ".")))
            .map_err(|e| invalid("email", &e))?,
        None,
    )
    .with_assignments(roles.iter().copied().collect::<BTreeSet<_>>(), plugins);

    store.insert(new_user).await
}

/// Owned copies of string literals, the shape form fields arrive in.
#[must_use]
pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|&value| value.to_owned()).collect()
}

/// A copy of `user` with timestamps cleared, for comparing records across saves.
#[must_use]
pub fn without_timestamps(user: &User) -> User {
    User {
        created_at: DateTime::UNIX_EPOCH,
        updated_at: DateTime::UNIX_EPOCH,
        ..user.clone()
    }
}
