//! User administration service.
//!
//! The new/create/edit/update/list actions behind the admin panel's users
//! screen. Every operation takes the acting user explicitly and returns plain
//! data; presenting it (forms, redirects, flash messages) is the caller's job.

mod authorizer;
mod memento;

pub use authorizer::{CommitFailure, PreparedUpdate, UserAdminAuthorizer, resolve_roles};
pub use memento::Memento;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use cms_users_core::{Email, Plugin, PluginRegistry, Role, UserId, Username};

use crate::config::UserAdminSettings;
use crate::db::{StoreError, UserStore};
use crate::error::UserAdminError;
use crate::models::{FieldErrors, NewUser, ProfileChanges, User};
use crate::services::invitations::InvitationSender;

/// Submitted data for a new user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewUserForm {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    /// Selected plugin names.
    pub plugins: Vec<String>,
    /// Selected role names; ignored unless the actor can assign roles.
    pub roles: Vec<String>,
}

/// Submitted changes for an existing user. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// Selected plugin names; `None` or empty keeps the current plugins.
    pub plugins: Option<Vec<String>>,
    /// Selected role names; `None` keeps the current roles. Ignored unless
    /// the actor can assign roles.
    pub roles: Option<Vec<String>>,
}

/// What a user form needs to render.
#[derive(Debug, Clone, Serialize)]
pub struct UserFormData {
    /// The user being edited, `None` for a new user.
    pub user: Option<User>,
    pub selected_plugin_names: Vec<String>,
    /// Grantable plugins, sorted by title.
    pub available_plugins: Vec<Plugin>,
    pub available_roles: Vec<Role>,
}

/// Result of a successful create.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub user: User,
    /// Whether the invitation was handed off; failures are logged.
    pub invitation_sent: bool,
}

/// User administration service.
pub struct UserAdminService<'a, S, I> {
    store: &'a S,
    invitations: &'a I,
    plugins: &'a PluginRegistry,
    authorizer: UserAdminAuthorizer<'a>,
}

impl<'a, S, I> UserAdminService<'a, S, I>
where
    S: UserStore,
    I: InvitationSender,
{
    /// Create a new user administration service.
    #[must_use]
    pub const fn new(
        store: &'a S,
        invitations: &'a I,
        settings: &'a UserAdminSettings,
        plugins: &'a PluginRegistry,
    ) -> Self {
        Self {
            store,
            invitations,
            plugins,
            authorizer: UserAdminAuthorizer::new(settings, plugins),
        }
    }

    /// The authorizer this service decides with.
    #[must_use]
    pub const fn authorizer(&self) -> &UserAdminAuthorizer<'a> {
        &self.authorizer
    }

    /// All users, ordered by username.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the actor cannot manage users, or `Store` if
    /// the read fails.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn list(&self, actor: &User) -> Result<Vec<User>, UserAdminError> {
        self.require_manager(actor, "list users")?;
        Ok(self.store.list().await?)
    }

    /// Form data for a new user.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the actor cannot manage users.
    pub fn new_form(&self, actor: &User) -> Result<UserFormData, UserAdminError> {
        self.require_manager(actor, "create users")?;
        Ok(self.form_data(None, Vec::new()))
    }

    /// Create a user, assign plugins and roles, and invite them.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized`, `ValidationFailed` for invalid or duplicate
    /// attributes, `UnknownRole`/`UnknownPlugin` for unregistered selections,
    /// or `Store` if the insert fails. A failed insert leaves nothing behind.
    #[instrument(skip(self, actor, form), fields(actor_id = %actor.id))]
    pub async fn create(
        &self,
        actor: &User,
        form: NewUserForm,
    ) -> Result<CreatedUser, UserAdminError> {
        self.require_manager(actor, "create users")?;

        let new_user = parse_new_user(&form).map_err(UserAdminError::ValidationFailed)?;
        let plugins = self.authorizer.resolve_plugins(&form.plugins)?;
        let roles = if self.authorizer.can_assign_roles(actor) {
            resolve_roles(&form.roles)?
        } else {
            BTreeSet::from([Role::BASELINE])
        };

        let user = self
            .store
            .insert(new_user.with_assignments(roles, plugins))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to insert user");
                validation_or_store(e)
            })?;

        let inviter = actor.username.display_name();
        let invitation_sent = match self.invitations.send_invitation(&user, &inviter).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to send invitation");
                false
            }
        };

        tracing::info!(user_id = %user.id, username = %user.username, "User created");
        Ok(CreatedUser {
            user,
            invitation_sent,
        })
    }

    /// Form data for editing an existing user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Unauthorized`.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn edit(&self, actor: &User, id: UserId) -> Result<UserFormData, UserAdminError> {
        let target = self.find_editable(actor, id).await?;
        let selected = target.plugin_names();
        Ok(self.form_data(Some(target), selected))
    }

    /// Update a user's profile, roles and plugins.
    ///
    /// Self-edits that would drop the baseline role or plugin are rejected
    /// before anything is touched. If the save fails the previous roles and
    /// plugins are restored.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Unauthorized`, `LockoutPrevented`,
    /// `UnknownRole`/`UnknownPlugin`, `ValidationFailed`, `PersistFailure`,
    /// or the fatal `RollbackFailure`.
    #[instrument(skip(self, actor, form), fields(actor_id = %actor.id))]
    pub async fn update(
        &self,
        actor: &User,
        id: UserId,
        form: UpdateUserForm,
    ) -> Result<User, UserAdminError> {
        let mut target = self.find_editable(actor, id).await?;

        let can_assign_roles = self.authorizer.can_assign_roles(actor);
        let role_names = match &form.roles {
            Some(proposed) if can_assign_roles => proposed.clone(),
            _ => target.role_names(),
        };
        let proposed_plugins = form.plugins.as_deref().unwrap_or_default();

        if self
            .authorizer
            .would_lock_out(actor, &target, proposed_plugins, &role_names)
        {
            tracing::warn!(user_id = %target.id, "Rejected update that would lock the user out");
            return Err(UserAdminError::LockoutPrevented);
        }

        let changes = parse_profile_changes(&form).map_err(UserAdminError::ValidationFailed)?;
        let prepared = self.authorizer.prepare_update(
            &target,
            &role_names,
            form.plugins.as_deref(),
            can_assign_roles,
        )?;

        match self
            .authorizer
            .commit(self.store, &mut target, prepared, changes)
            .await
        {
            Ok(()) => {
                tracing::info!(user_id = %target.id, "User updated");
                Ok(target)
            }
            Err(failure) => {
                tracing::warn!(user_id = %target.id, error = %failure.cause, "User update failed, rolling back");
                self.authorizer
                    .rollback(self.store, &mut target, failure.memento)
                    .await?;
                Err(match failure.cause {
                    StoreError::Validation(errors) => UserAdminError::ValidationFailed(errors),
                    source => {
                        tracing::error!(user_id = %target.id, error = %source, "Failed to save user");
                        UserAdminError::PersistFailure {
                            user_id: target.id,
                            source,
                        }
                    }
                })
            }
        }
    }

    fn require_manager(&self, actor: &User, action: &str) -> Result<(), UserAdminError> {
        if self.authorizer.can_manage_users(actor) {
            Ok(())
        } else {
            tracing::warn!(actor_id = %actor.id, action, "Actor without user management access");
            Err(UserAdminError::Unauthorized(format!(
                "{} cannot {action}",
                actor.username
            )))
        }
    }

    async fn find_editable(&self, actor: &User, id: UserId) -> Result<User, UserAdminError> {
        let target = self
            .store
            .find(id)
            .await?
            .ok_or(UserAdminError::NotFound(id))?;

        if !self.authorizer.can_edit(actor, &target) {
            tracing::warn!(
                actor_id = %actor.id,
                user_id = %target.id,
                "Someone without permission tried to modify a user"
            );
            return Err(UserAdminError::Unauthorized(format!(
                "{} cannot edit {}",
                actor.username, target.username
            )));
        }
        Ok(target)
    }

    fn form_data(&self, user: Option<User>, selected_plugin_names: Vec<String>) -> UserFormData {
        UserFormData {
            user,
            selected_plugin_names,
            available_plugins: self.plugins.in_menu().into_iter().cloned().collect(),
            available_roles: Role::ALL.to_vec(),
        }
    }
}

/// Store validation failures become `ValidationFailed`; anything else is a store error.
fn validation_or_store(error: StoreError) -> UserAdminError {
    match error {
        StoreError::Validation(errors) => UserAdminError::ValidationFailed(errors),
        other => UserAdminError::Store(other),
    }
}

fn parse_new_user(form: &NewUserForm) -> Result<NewUser, FieldErrors> {
    let mut errors = FieldErrors::new();
    let username = Username::parse(&form.username)
        .map_err(|e| errors.add("username", &e.to_string()))
        .ok();
    let email = Email::parse(&form.email)
        .map_err(|e| errors.add("email", &e.to_string()))
        .ok();

    match (username, email) {
        (Some(username), Some(email)) => Ok(NewUser::new(
            username,
            email,
            form.full_name.clone().filter(|name| !name.trim().is_empty()),
        )),
        _ => Err(errors),
    }
}

fn parse_profile_changes(form: &UpdateUserForm) -> Result<ProfileChanges, FieldErrors> {
    let mut errors = FieldErrors::new();
    let username = form
        .username
        .as_deref()
        .map(Username::parse)
        .transpose()
        .map_err(|e| errors.add("username", &e.to_string()))
        .ok()
        .flatten();
    let email = form
        .email
        .as_deref()
        .map(Email::parse)
        .transpose()
        .map_err(|e| errors.add("email", &e.to_string()))
        .ok()
        .flatten();

    errors.into_result()?;
    Ok(ProfileChanges {
        username,
        email,
        full_name: form.full_name.clone(),
    })
}
