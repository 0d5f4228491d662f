//! Invitations sent to newly created users.
//!
//! Delivery (and the password-reset token it carries) belongs to the
//! authentication layer; this module only defines the seam the user service
//! calls after a successful create.

use std::future::Future;

use thiserror::Error;

use crate::models::User;

/// Errors that can occur while sending an invitation.
#[derive(Debug, Error)]
pub enum InvitationError {
    /// The message could not be handed off for delivery.
    #[error("invitation delivery failed: {0}")]
    Delivery(String),
}

/// Sends "you have been invited" messages.
pub trait InvitationSender: Send + Sync {
    /// Invite `invitee`, naming `inviter` as the person who created the account.
    fn send_invitation(
        &self,
        invitee: &User,
        inviter: &str,
    ) -> impl Future<Output = Result<(), InvitationError>> + Send;
}

/// Records invitations in the log for an operator to pass on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogInvitationSender;

impl InvitationSender for LogInvitationSender {
    async fn send_invitation(&self, invitee: &User, inviter: &str) -> Result<(), InvitationError> {
        tracing::info!(
            user_id = %invitee.id,
            email = %invitee.email,
            inviter,
            "Invitation ready: ask the user to set a password via the reset flow"
        );
        Ok(())
    }
}
