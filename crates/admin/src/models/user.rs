//! User domain types.
//!
//! These types represent validated domain objects for user administration.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cms_users_core::{Email, PluginName, Role, UserId, Username};

/// A user account (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login name.
    pub username: Username,
    /// Email address (normalized).
    pub email: Email,
    /// Optional full name.
    pub full_name: Option<String>,
    /// Granted roles.
    pub roles: BTreeSet<Role>,
    /// Granted plugins, in menu position order.
    pub plugins: Vec<PluginName>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the user holds the elevated [`Role::Superuser`] role.
    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.has_role(Role::Superuser)
    }

    /// Whether the user has access to the plugin called `name`.
    #[must_use]
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|plugin| *plugin == *name)
    }

    /// Canonical names of the user's roles.
    #[must_use]
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.as_str().to_owned()).collect()
    }

    /// Names of the user's plugins, in position order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|plugin| plugin.as_str().to_owned()).collect()
    }

    /// Apply profile changes in place.
    pub fn apply_profile(&mut self, changes: ProfileChanges) {
        if let Some(username) = changes.username {
            self.username = username;
        }
        if let Some(email) = changes.email {
            self.email = email;
        }
        if let Some(full_name) = changes.full_name {
            self.full_name = Some(full_name).filter(|name| !name.trim().is_empty());
        }
    }
}

/// Attributes for a user that has not been persisted yet.
///
/// Roles and plugins are written together with the account, so a failed
/// insert never leaves a user without its assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Login name.
    pub username: Username,
    /// Email address.
    pub email: Email,
    /// Optional full name.
    pub full_name: Option<String>,
    /// Granted roles.
    pub roles: BTreeSet<Role>,
    /// Granted plugins, in order.
    pub plugins: Vec<PluginName>,
}

impl NewUser {
    /// A new user without roles or plugins.
    #[must_use]
    pub const fn new(username: Username, email: Email, full_name: Option<String>) -> Self {
        Self {
            username,
            email,
            full_name,
            roles: BTreeSet::new(),
            plugins: Vec::new(),
        }
    }

    /// Builder-style assignment of roles and plugins.
    #[must_use]
    pub fn with_assignments(mut self, roles: BTreeSet<Role>, plugins: Vec<PluginName>) -> Self {
        self.roles = roles;
        self.plugins = plugins;
        self
    }
}

/// Profile attributes changed by an update. `None` leaves a field as is.
///
/// An empty `full_name` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    /// New login name.
    pub username: Option<Username>,
    /// New email address.
    pub email: Option<Email>,
    /// New full name.
    pub full_name: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(1),
            username: Username::parse("editor").unwrap(),
            email: Email::parse("editor@site.test").unwrap(),
            full_name: Some("Ed Itor".to_owned()),
            roles: BTreeSet::from([Role::Refinery]),
            plugins: vec![PluginName::baseline()],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_and_plugin_queries() {
        let user = user();
        assert!(user.has_role(Role::Refinery));
        assert!(!user.is_superuser());
        assert!(user.has_plugin(PluginName::BASELINE));
        assert!(!user.has_plugin("refinery_pages"));
        assert_eq!(user.role_names(), ["refinery"]);
        assert_eq!(user.plugin_names(), [PluginName::BASELINE]);
    }

    #[test]
    fn test_apply_profile_only_touches_given_fields() {
        let mut user = user();
        user.apply_profile(ProfileChanges {
            email: Some(Email::parse("new@site.test").unwrap()),
            ..ProfileChanges::default()
        });

        assert_eq!(user.email.as_str(), "new@site.test");
        assert_eq!(user.username.as_str(), "editor");
        assert_eq!(user.full_name.as_deref(), Some("Ed Itor"));
    }

    #[test]
    fn test_apply_profile_blank_full_name_clears_it() {
        let mut user = user();
        user.apply_profile(ProfileChanges {
            full_name: Some("  ".to_owned()),
            ..ProfileChanges::default()
        });
        assert_eq!(user.full_name, None);
    }
}
