//! CMS Users Admin library.
//!
//! User administration for the CMS admin panel: who may edit whom, which
//! roles and plugins a user ends up with, protection against locking yourself
//! out, and rollback of role/plugin changes when a save fails.
//!
//! # Layout
//!
//! - [`services::users`] - `UserAdminAuthorizer` and `UserAdminService`
//! - [`db`] - `UserStore` seam with `PostgreSQL` and in-memory stores
//! - [`models`] - `User` and validation errors
//! - [`config`] - environment configuration
//! - [`error`] - `UserAdminError` and rollback-failure reporting
//!
//! HTTP handling, views, sessions and password management are left to the
//! embedding application; everything here returns plain `Result`s.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use error::{ErrorKind, UserAdminError};
