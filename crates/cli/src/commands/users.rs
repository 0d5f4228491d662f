//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create the first superuser (only while no users exist)
//! cms-users users bootstrap -u admin -e admin@example.com
//!
//! # Act as an existing user
//! cms-users users list --as admin
//! cms-users users create --as admin -u editor -e editor@example.com --plugin refinery_pages
//! cms-users users update 2 --as admin --role refinery --role superuser
//! ```
//!
//! Results are printed to stdout as JSON.

use std::collections::BTreeSet;

use serde_json::json;

use cms_users_admin::config::UserAdminSettings;
use cms_users_admin::db::{PgUserStore, UserStore};
use cms_users_admin::error::set_sentry_actor;
use cms_users_admin::models::{NewUser, User};
use cms_users_admin::services::{
    LogInvitationSender, NewUserForm, UpdateUserForm, UserAdminService,
};
use cms_users_core::{Email, PluginRegistry, Role, UserId, Username};

use super::CliError;

/// Everything a user command needs.
pub struct Context {
    pub store: PgUserStore,
    pub settings: UserAdminSettings,
    pub plugins: PluginRegistry,
    pub invitations: LogInvitationSender,
}

/// Profile and assignment arguments shared by `create` and `update`.
#[derive(Debug, Default)]
pub struct UserArgs {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub plugins: Vec<String>,
    pub roles: Vec<String>,
}

impl Context {
    fn service(&self) -> UserAdminService<'_, PgUserStore, LogInvitationSender> {
        UserAdminService::new(&self.store, &self.invitations, &self.settings, &self.plugins)
    }

    /// Resolve `--as` to a stored user.
    async fn actor(&self, username: &str) -> Result<User, CliError> {
        let name =
            Username::parse(username).map_err(|e| CliError::InvalidInput(e.to_string()))?;
        let actor = self
            .store
            .find_by_username(&name)
            .await?
            .ok_or_else(|| CliError::UnknownActor(username.to_owned()))?;

        set_sentry_actor(actor.id, actor.username.as_str());
        Ok(actor)
    }
}

#[allow(clippy::print_stdout)]
fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Create the first user with every role and every registered plugin.
///
/// # Errors
///
/// Returns `CliError::InvalidInput` if users already exist or the arguments
/// are invalid.
pub async fn bootstrap(
    ctx: &Context,
    username: &str,
    email: &str,
    full_name: Option<String>,
) -> Result<(), CliError> {
    if !ctx.store.list().await?.is_empty() {
        return Err(CliError::InvalidInput(
            "users already exist; use `users create --as <superuser>` instead".to_owned(),
        ));
    }

    let new_user = NewUser::new(
        Username::parse(username).map_err(|e| CliError::InvalidInput(e.to_string()))?,
        Email::parse(email).map_err(|e| CliError::InvalidInput(e.to_string()))?,
        full_name,
    )
    .with_assignments(BTreeSet::from(Role::ALL), ctx.plugins.names());

    let user = ctx.store.insert(new_user).await?;

    tracing::info!(user_id = %user.id, username = %user.username, "Bootstrap superuser created");
    print_json(&user)
}

/// List users visible to the actor.
///
/// # Errors
///
/// Returns an error if the actor is unknown or not allowed to list users.
pub async fn list(ctx: &Context, actor: &str) -> Result<(), CliError> {
    let actor = ctx.actor(actor).await?;
    let users = ctx.service().list(&actor).await?;
    print_json(&users)
}

/// Show a user together with the choices an edit form would offer.
///
/// # Errors
///
/// Returns an error if the actor is unknown, the user is missing, or the
/// actor may not edit them.
pub async fn show(ctx: &Context, actor: &str, id: i64) -> Result<(), CliError> {
    let actor = ctx.actor(actor).await?;
    let form = ctx.service().edit(&actor, UserId::new(id)).await?;
    print_json(&form)
}

/// Create a user as the actor.
///
/// # Errors
///
/// Returns an error if the actor is unknown or the service rejects the create.
pub async fn create(ctx: &Context, actor: &str, args: UserArgs) -> Result<(), CliError> {
    let actor = ctx.actor(actor).await?;
    let form = NewUserForm {
        username: args.username.unwrap_or_default(),
        email: args.email.unwrap_or_default(),
        full_name: args.full_name,
        plugins: args.plugins,
        roles: args.roles,
    };

    let created = ctx.service().create(&actor, form).await?;
    print_json(&created)
}

/// Update a user as the actor.
///
/// Without `--role` the user keeps their roles, and without `--plugin` their
/// plugins.
///
/// # Errors
///
/// Returns an error if the actor is unknown or the service rejects the update.
pub async fn update(ctx: &Context, actor: &str, id: i64, args: UserArgs) -> Result<(), CliError> {
    let actor = ctx.actor(actor).await?;
    let form = UpdateUserForm {
        username: args.username,
        email: args.email,
        full_name: args.full_name,
        plugins: Some(args.plugins).filter(|plugins| !plugins.is_empty()),
        roles: Some(args.roles).filter(|roles| !roles.is_empty()),
    };

    let updated = ctx.service().update(&actor, UserId::new(id), form).await?;
    print_json(&json!({ "updated": updated }))
}
