//! CMS Users Core - Shared domain types for user administration.
//!
//! This crate provides the types shared by the user administration components:
//! - `admin` - Authorization, lockout prevention, and persistence of user accounts
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types and reference data - no I/O, no database
//! access. Role and plugin lookups are explicit registries rather than
//! process-wide globals, so callers always pass the data they authorize against.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, usernames, roles, and plugins

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
