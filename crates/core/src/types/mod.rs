//! Core types for user administration.
//!
//! This module provides type-safe wrappers for the user administration domain.

pub mod email;
pub mod id;
pub mod plugin;
pub mod role;
pub mod username;

pub use email::{Email, EmailError};
pub use id::*;
pub use plugin::{Plugin, PluginName, PluginNameError, PluginRegistry};
pub use role::{Role, UnknownRoleError};
pub use username::{Username, UsernameError};
