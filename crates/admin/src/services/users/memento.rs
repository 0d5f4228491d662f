//! Snapshot of a user's assignments taken before an update.

use std::collections::BTreeSet;

use cms_users_core::{PluginName, Role, UserId};

use crate::models::User;

/// Roles and plugins a user held before an update was attempted.
///
/// Lives only for the duration of one update and is consumed by either a
/// successful commit (dropped) or a rollback (restored).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memento {
    user_id: UserId,
    roles: BTreeSet<Role>,
    plugins: Vec<PluginName>,
}

impl Memento {
    /// Snapshot `user`'s current roles and plugins.
    #[must_use]
    pub fn capture(user: &User) -> Self {
        Self {
            user_id: user.id,
            roles: user.roles.clone(),
            plugins: user.plugins.clone(),
        }
    }

    /// The user the snapshot belongs to.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Roles at capture time.
    #[must_use]
    pub const fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Plugins at capture time.
    #[must_use]
    pub fn plugins(&self) -> &[PluginName] {
        &self.plugins
    }

    /// Put the captured roles and plugins back on `user`.
    pub fn restore(self, user: &mut User) {
        debug_assert_eq!(self.user_id, user.id, "memento restored onto another user");
        user.roles = self.roles;
        user.plugins = self.plugins;
    }
}
