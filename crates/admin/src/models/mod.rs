//! Domain models for user administration.

pub mod user;
pub mod validation;

pub use user::{NewUser, ProfileChanges, User};
pub use validation::FieldErrors;
