//! Username type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Username`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    /// Nothing left after trimming.
    #[error("username can't be blank")]
    Blank,
    /// Longer than [`Username::MAX_LENGTH`] characters.
    #[error("username must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// A login name, trimmed of surrounding whitespace.
///
/// Case is preserved for display; the stores compare usernames
/// case-insensitively via [`Username::key`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Maximum length in characters.
    pub const MAX_LENGTH: usize = 64;

    /// Parse a username.
    ///
    /// # Errors
    ///
    /// Returns [`UsernameError::Blank`] for empty or whitespace-only input and
    /// [`UsernameError::TooLong`] past [`Username::MAX_LENGTH`] characters.
    pub fn parse(input: &str) -> Result<Self, UsernameError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(UsernameError::Blank);
        }
        if trimmed.chars().count() > Self::MAX_LENGTH {
            return Err(UsernameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used for uniqueness and ordering.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    /// Human-facing name: every whitespace-separated word capitalised.
    ///
    /// ```
    /// use cms_users_core::Username;
    ///
    /// let name = Username::parse("ada  lovelace").unwrap();
    /// assert_eq!(name.display_name(), "Ada Lovelace");
    /// ```
    #[must_use]
    pub fn display_name(&self) -> String {
        self.0
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Upper-case the first character and lower-case the rest.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Username {
    type Err = UsernameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Username {
    type Error = UsernameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(username: Username) -> Self {
        username.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        assert_eq!(Username::parse("  editor ").unwrap().as_str(), "editor");
    }

    #[test]
    fn test_parse_rejects_blank_and_long() {
        assert_eq!(Username::parse(" \t "), Err(UsernameError::Blank));
        assert!(matches!(
            Username::parse(&"x".repeat(65)),
            Err(UsernameError::TooLong { max: 64 })
        ));
        assert!(Username::parse(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_display_name_capitalizes_words() {
        let name = Username::parse("mARY ann  SMITH").unwrap();
        assert_eq!(name.display_name(), "Mary Ann Smith");
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let a = Username::parse("Admin").unwrap();
        let b = Username::parse("ADMIN").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
    }
}
