//! Business logic services for user administration.

pub mod invitations;
pub mod users;

pub use invitations::{InvitationError, InvitationSender, LogInvitationSender};
pub use users::{
    CommitFailure, CreatedUser, Memento, NewUserForm, PreparedUpdate, UpdateUserForm,
    UserAdminAuthorizer, UserAdminService, UserFormData,
};
