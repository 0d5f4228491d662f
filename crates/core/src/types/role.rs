//! Roles that can be granted to users.
//!
//! Roles are fixed reference data. Lookups by name are case-insensitive and
//! return `None` for names that are not registered, so an unknown role can be
//! reported instead of silently created.

use serde::{Deserialize, Serialize};

/// Returned when a role name is not in the registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRoleError(pub String);

/// A named permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Baseline role; required to enter the admin panel at all.
    Refinery,
    /// Elevated role; may edit any user and assign roles.
    Superuser,
}

impl Role {
    /// Every registered role, in display order.
    pub const ALL: [Self; 2] = [Self::Refinery, Self::Superuser];

    /// The role a user must keep to retain admin-panel access.
    pub const BASELINE: Self = Self::Refinery;

    /// Canonical (lower-case) name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Refinery => "refinery",
            Self::Superuser => "superuser",
        }
    }

    /// Human-facing title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Refinery => "Refinery",
            Self::Superuser => "Superuser",
        }
    }

    /// Look a role up by name, ignoring case and surrounding whitespace.
    ///
    /// ```
    /// use cms_users_core::Role;
    ///
    /// assert_eq!(Role::lookup("SuperUser"), Some(Role::Superuser));
    /// assert_eq!(Role::lookup("editor"), None);
    /// ```
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| UnknownRoleError(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(Role::lookup("refinery"), Some(Role::Refinery));
        assert_eq!(Role::lookup("Refinery"), Some(Role::Refinery));
        assert_eq!(Role::lookup(" SUPERUSER "), Some(Role::Superuser));
    }

    #[test]
    fn test_lookup_unknown_is_none() {
        assert_eq!(Role::lookup(""), None);
        assert_eq!(Role::lookup("admin"), None);
    }

    #[test]
    fn test_from_str_reports_name() {
        let err = "owner".parse::<Role>().err();
        assert_eq!(err, Some(UnknownRoleError("owner".to_owned())));
    }

    #[test]
    fn test_display_round_trips_through_lookup() {
        for role in Role::ALL {
            assert_eq!(Role::lookup(&role.to_string()), Some(role));
        }
    }

    #[test]
    fn test_title_differs_in_case_only() {
        for role in Role::ALL {
            assert!(role.title().eq_ignore_ascii_case(role.as_str()));
        }
    }
}
