//! Admin-panel plugins and the registry they are looked up in.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PluginName`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginNameError {
    /// Nothing left after trimming.
    #[error("plugin name can't be blank")]
    Blank,
    /// Characters outside `[a-z0-9_]`.
    #[error("plugin name {0:?} may only contain lowercase letters, digits and underscores")]
    InvalidCharacters(String),
}

/// Identifier of a plugin, e.g. `refinery_authentication_devise`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PluginName(String);

impl PluginName {
    /// Name of the plugin a user must keep to retain admin-panel access.
    pub const BASELINE: &'static str = "refinery_authentication_devise";

    /// Parse a plugin name.
    ///
    /// # Errors
    ///
    /// Returns [`PluginNameError`] for blank input or characters outside
    /// `[a-z0-9_]`.
    pub fn parse(input: &str) -> Result<Self, PluginNameError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PluginNameError::Blank);
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(PluginNameError::InvalidCharacters(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// The baseline plugin name.
    #[must_use]
    pub fn baseline() -> Self {
        Self(Self::BASELINE.to_owned())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PluginName {
    type Error = PluginNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PluginName> for String {
    fn from(name: PluginName) -> Self {
        name.0
    }
}

impl PartialEq<str> for PluginName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    /// Unique plugin name.
    pub name: PluginName,
    /// Title shown in the admin menu.
    pub title: String,
    /// Whether the plugin appears in the admin menu (and so can be granted).
    pub in_menu: bool,
}

impl Plugin {
    /// Create a plugin that appears in the menu.
    #[must_use]
    pub fn new(name: PluginName, title: impl Into<String>) -> Self {
        Self {
            name,
            title: title.into(),
            in_menu: true,
        }
    }

    /// Hide the plugin from the menu.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.in_menu = false;
        self
    }
}

/// The set of plugins known to the admin panel.
///
/// Passed explicitly to whatever needs it; there is no process-wide instance.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    /// An empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// The plugins shipped with the admin panel.
    #[must_use]
    pub fn builtin() -> Self {
        [
            (PluginName::BASELINE, "Users"),
            ("refinery_dashboard", "Dashboard"),
            ("refinery_pages", "Pages"),
            ("refinery_images", "Images"),
            ("refinery_files", "Files"),
        ]
        .into_iter()
        .map(|(name, title)| Plugin::new(PluginName(name.to_owned()), title))
        .fold(Self::new(), Self::with)
    }

    /// Builder-style [`PluginRegistry::register`].
    #[must_use]
    pub fn with(mut self, plugin: Plugin) -> Self {
        self.register(plugin);
        self
    }

    /// Register a plugin, replacing any existing plugin with the same name.
    pub fn register(&mut self, plugin: Plugin) {
        if let Some(existing) = self.plugins.iter_mut().find(|p| p.name == plugin.name) {
            *existing = plugin;
        } else {
            self.plugins.push(plugin);
        }
    }

    /// All registered plugins, in registration order.
    #[must_use]
    pub fn registered(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Plugins that appear in the menu, sorted by title.
    #[must_use]
    pub fn in_menu(&self) -> Vec<&Plugin> {
        let mut plugins: Vec<&Plugin> = self.plugins.iter().filter(|p| p.in_menu).collect();
        plugins.sort_by(|a, b| a.title.cmp(&b.title));
        plugins
    }

    /// Look a plugin up by exact name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name == *name)
    }

    /// Names of every registered plugin.
    #[must_use]
    pub fn names(&self) -> Vec<PluginName> {
        self.plugins.iter().map(|p| p.name.clone()).collect()
    }
}
