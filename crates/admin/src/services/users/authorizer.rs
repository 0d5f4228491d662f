//! Authorization, lockout prevention and rollback for user updates.
//!
//! An update moves through
//! `Received -> LockoutCheck -> {Rejected | MementoCapture -> Apply -> {Committed | RolledBack}}`:
//! [`UserAdminAuthorizer::would_lock_out`] is the lockout check,
//! [`UserAdminAuthorizer::prepare_update`] captures the memento,
//! [`UserAdminAuthorizer::commit`] applies, and [`UserAdminAuthorizer::rollback`]
//! restores the memento when the commit fails.

use std::collections::BTreeSet;

use cms_users_core::{PluginName, PluginRegistry, Role};

use super::memento::Memento;
use crate::config::UserAdminSettings;
use crate::db::{StoreError, UserStore};
use crate::error::{UserAdminError, report_rollback_failure};
use crate::models::{ProfileChanges, User};

/// Effective assignment for an update, plus the state to roll back to.
#[derive(Debug)]
pub struct PreparedUpdate {
    /// Roles the target ends up with.
    pub roles: BTreeSet<Role>,
    /// Plugins the target ends up with.
    pub plugins: Vec<PluginName>,
    /// Assignment before the update.
    pub memento: Memento,
}

/// A commit that did not persist. Hand the memento to
/// [`UserAdminAuthorizer::rollback`].
#[derive(Debug)]
pub struct CommitFailure {
    /// Assignment before the update.
    pub memento: Memento,
    /// Why the save failed.
    pub cause: StoreError,
}

/// Decides what an actor may do to a user and applies updates safely.
#[derive(Debug, Clone, Copy)]
pub struct UserAdminAuthorizer<'a> {
    settings: &'a UserAdminSettings,
    plugins: &'a PluginRegistry,
}

impl<'a> UserAdminAuthorizer<'a> {
    /// Create an authorizer over site settings and the plugin registry.
    #[must_use]
    pub const fn new(settings: &'a UserAdminSettings, plugins: &'a PluginRegistry) -> Self {
        Self { settings, plugins }
    }

    /// Whether `actor` may edit `target`: themselves, or anyone as a superuser.
    #[must_use]
    pub fn can_edit(&self, actor: &User, target: &User) -> bool {
        actor.id == target.id || actor.is_superuser()
    }

    /// Whether `actor` may list and create users.
    #[must_use]
    pub fn can_manage_users(&self, actor: &User) -> bool {
        actor.is_superuser() || actor.has_plugin(PluginName::BASELINE)
    }

    /// Whether `actor`'s role proposals are honoured.
    #[must_use]
    pub fn can_assign_roles(&self, actor: &User) -> bool {
        self.settings.allow_non_superuser_role_assignment || actor.is_superuser()
    }

    /// Whether applying the proposal would cost `actor` their own admin access.
    ///
    /// Only self-edits can lock out, and an empty plugin proposal leaves
    /// plugins untouched, so both short-circuit to `false`. Role names are
    /// compared case-insensitively.
    #[must_use]
    pub fn would_lock_out(
        &self,
        actor: &User,
        target: &User,
        proposed_plugins: &[String],
        proposed_roles: &[String],
    ) -> bool {
        if actor.id != target.id || proposed_plugins.is_empty() {
            return false;
        }

        let keeps_plugin = proposed_plugins
            .iter()
            .any(|name| name == PluginName::BASELINE);
        let keeps_role = proposed_roles
            .iter()
            .any(|name| name.eq_ignore_ascii_case(Role::BASELINE.as_str()));

        !keeps_plugin || !keeps_role
    }

    /// Resolve the effective assignment and snapshot the current one.
    ///
    /// Without role-assignment rights the target keeps its roles and the
    /// proposal is not even looked at. A missing or empty plugin proposal
    /// keeps the target's plugins.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRole`/`UnknownPlugin` for names not in the registries.
    pub fn prepare_update(
        &self,
        target: &User,
        proposed_roles: &[String],
        proposed_plugins: Option<&[String]>,
        actor_can_assign_roles: bool,
    ) -> Result<PreparedUpdate, UserAdminError> {
        let roles = if actor_can_assign_roles {
            resolve_roles(proposed_roles)?
        } else {
            target.roles.clone()
        };

        let plugins = match proposed_plugins {
            Some(names) if !names.is_empty() => self.resolve_plugins(names)?,
            _ => target.plugins.clone(),
        };

        Ok(PreparedUpdate {
            roles,
            plugins,
            memento: Memento::capture(target),
        })
    }

    /// Look plugin names up in the registry, dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlugin` for the first unregistered name.
    pub fn resolve_plugins(&self, names: &[String]) -> Result<Vec<PluginName>, UserAdminError> {
        let mut resolved: Vec<PluginName> = Vec::with_capacity(names.len());
        for name in names {
            let plugin = self
                .plugins
                .find(name.trim())
                .ok_or_else(|| UserAdminError::UnknownPlugin(name.clone()))?;
            if !resolved.contains(&plugin.name) {
                resolved.push(plugin.name.clone());
            }
        }
        Ok(resolved)
    }

    /// Apply the prepared assignment and profile changes, then persist.
    ///
    /// `target` is only replaced once the save succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitFailure`] carrying the memento when the save fails.
    pub async fn commit<S: UserStore>(
        &self,
        store: &S,
        target: &mut User,
        update: PreparedUpdate,
        changes: ProfileChanges,
    ) -> Result<(), CommitFailure> {
        let PreparedUpdate {
            roles,
            plugins,
            memento,
        } = update;

        let mut candidate = target.clone();
        candidate.roles = roles;
        candidate.plugins = plugins;
        candidate.apply_profile(changes);

        match store.save(&candidate).await {
            Ok(()) => {
                *target = candidate;
                Ok(())
            }
            Err(cause) => Err(CommitFailure { memento, cause }),
        }
    }

    /// Restore `target` to the memento and persist it.
    ///
    /// # Errors
    ///
    /// Returns `MementoMismatch` without touching `target` if the memento was
    /// captured from another user, or `RollbackFailure` if the save fails.
    /// Both are logged and reported to Sentry before returning.
    pub async fn rollback<S: UserStore>(
        &self,
        store: &S,
        target: &mut User,
        memento: Memento,
    ) -> Result<(), UserAdminError> {
        if memento.user_id() != target.id {
            let error = UserAdminError::MementoMismatch {
                user_id: target.id,
                memento_user_id: memento.user_id(),
            };
            report_rollback_failure(&error);
            return Err(error);
        }

        memento.restore(target);
        store.save(target).await.map_err(|source| {
            let error = UserAdminError::RollbackFailure {
                user_id: target.id,
                source,
            };
            report_rollback_failure(&error);
            error
        })
    }
}

/// Look role names up, ignoring case.
///
/// # Errors
///
/// Returns `UnknownRole` for the first unregistered name.
pub fn resolve_roles(names: &[String]) -> Result<BTreeSet<Role>, UserAdminError> {
    names
        .iter()
        .map(|name| Role::lookup(name).ok_or_else(|| UserAdminError::UnknownRole(name.clone())))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use cms_users_core::{Email, Plugin, UserId, Username};

    use super::*;
    use crate::db::MemoryUserStore;
    use crate::models::NewUser;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn user(id: i64, roles: &[Role], plugins: &[&str]) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(id),
            username: Username::parse(&format!("user{id}")).unwrap(),
            email: Email::parse(&format!("user{id}@site.test")).unwrap(),
            full_name: None,
            roles: roles.iter().copied().collect(),
            plugins: plugins.iter().map(|p| PluginName::parse(p).unwrap()).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::builtin()
            .with(Plugin::new(PluginName::parse("other_plugin").unwrap(), "Other"))
    }

    const SETTINGS: UserAdminSettings = UserAdminSettings {
        allow_non_superuser_role_assignment: false,
    };

    #[test]
    fn test_can_edit_self() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let editor = user(1, &[Role::Refinery], &[]);

        assert!(authorizer.can_edit(&editor, &editor));
    }

    #[test]
    fn test_can_edit_others_requires_superuser() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let editor = user(1, &[Role::Refinery], &[PluginName::BASELINE]);
        let admin = user(2, &[Role::Refinery, Role::Superuser], &[]);
        let target = user(3, &[Role::Refinery], &[]);

        assert!(!authorizer.can_edit(&editor, &target));
        assert!(authorizer.can_edit(&admin, &target));
        assert!(authorizer.can_edit(&admin, &editor));
    }

    #[test]
    fn test_can_assign_roles() {
        let registry = registry();
        let editor = user(1, &[Role::Refinery], &[]);
        let admin = user(2, &[Role::Superuser], &[]);

        let strict = UserAdminAuthorizer::new(&SETTINGS, &registry);
        assert!(!strict.can_assign_roles(&editor));
        assert!(strict.can_assign_roles(&admin));

        let open_settings = UserAdminSettings {
            allow_non_superuser_role_assignment: true,
        };
        let open = UserAdminAuthorizer::new(&open_settings, &registry);
        assert!(open.can_assign_roles(&editor));
    }

    #[test]
    fn test_can_manage_users() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);

        assert!(authorizer.can_manage_users(&user(1, &[Role::Refinery], &[PluginName::BASELINE])));
        assert!(authorizer.can_manage_users(&user(2, &[Role::Superuser], &[])));
        assert!(!authorizer.can_manage_users(&user(3, &[Role::Refinery], &["refinery_pages"])));
    }

    #[test]
    fn test_lock_out_keeping_baseline_is_allowed() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let me = user(1, &[Role::Refinery], &[PluginName::BASELINE]);

        assert!(!authorizer.would_lock_out(
            &me,
            &me,
            &strings(&["refinery_authentication_devise"]),
            &strings(&["refinery"]),
        ));
    }

    #[test]
    fn test_lock_out_empty_plugins_short_circuits() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let me = user(1, &[Role::Refinery], &[PluginName::BASELINE]);

        assert!(!authorizer.would_lock_out(&me, &me, &[], &strings(&["refinery"])));
        assert!(!authorizer.would_lock_out(&me, &me, &[], &[]));
        assert!(!authorizer.would_lock_out(&me, &me, &[], &strings(&["superuser"])));
    }

    #[test]
    fn test_lock_out_removing_admin_plugin() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let me = user(1, &[Role::Refinery], &[PluginName::BASELINE]);

        assert!(authorizer.would_lock_out(
            &me,
            &me,
            &strings(&["other_plugin"]),
            &strings(&["refinery"]),
        ));
    }

    #[test]
    fn test_lock_out_removing_baseline_role_ignores_case() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let me = user(1, &[Role::Refinery], &[PluginName::BASELINE]);
        let plugins = strings(&[PluginName::BASELINE]);

        assert!(authorizer.would_lock_out(&me, &me, &plugins, &strings(&["superuser"])));
        assert!(!authorizer.would_lock_out(&me, &me, &plugins, &strings(&["Refinery"])));
        assert!(!authorizer.would_lock_out(&me, &me, &plugins, &strings(&["REFINERY"])));
    }

    #[test]
    fn test_lock_out_never_applies_to_other_users() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let admin = user(1, &[Role::Superuser], &[PluginName::BASELINE]);
        let target = user(2, &[Role::Refinery], &[PluginName::BASELINE]);

        assert!(!authorizer.would_lock_out(&admin, &target, &strings(&["other_plugin"]), &[]));
    }

    #[test]
    fn test_prepare_update_without_assignment_rights_keeps_roles() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let target = user(1, &[Role::Refinery], &[PluginName::BASELINE]);

        for proposal in [
            strings(&["superuser"]),
            strings(&[]),
            strings(&["not_a_role"]),
        ] {
            let prepared = authorizer
                .prepare_update(&target, &proposal, None, false)
                .unwrap();
            assert_eq!(prepared.roles, target.roles);
        }
    }

    #[test]
    fn test_prepare_update_resolves_proposals() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let target = user(1, &[Role::Refinery], &[PluginName::BASELINE]);

        let plugins = strings(&["refinery_pages", PluginName::BASELINE, "refinery_pages"]);
        let prepared = authorizer
            .prepare_update(&target, &strings(&["Refinery", "SUPERUSER"]), Some(plugins.as_slice()), true)
            .unwrap();

        assert_eq!(prepared.roles, BTreeSet::from([Role::Refinery, Role::Superuser]));
        assert_eq!(
            prepared.plugins,
            [
                PluginName::parse("refinery_pages").unwrap(),
                PluginName::baseline()
            ]
        );
        assert_eq!(prepared.memento, Memento::capture(&target));
    }

    #[test]
    fn test_prepare_update_empty_plugins_keeps_current() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let target = user(1, &[Role::Refinery], &[PluginName::BASELINE, "refinery_pages"]);

        let prepared = authorizer
            .prepare_update(&target, &[], Some(&[][..]), false)
            .unwrap();
        assert_eq!(prepared.plugins, target.plugins);
    }

    #[test]
    fn test_prepare_update_rejects_unknown_names() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let target = user(1, &[Role::Refinery], &[]);

        let err = authorizer
            .prepare_update(&target, &strings(&["owner"]), None, true)
            .unwrap_err();
        assert!(matches!(err, UserAdminError::UnknownRole(name) if name == "owner"));

        let plugins = strings(&["refinery_blog"]);
        let err = authorizer
            .prepare_update(&target, &[], Some(plugins.as_slice()), false)
            .unwrap_err();
        assert!(matches!(err, UserAdminError::UnknownPlugin(name) if name == "refinery_blog"));
    }

    /// Store that fails the first `failures` saves.
    struct FlakyStore {
        inner: MemoryUserStore,
        failures: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryUserStore::new(),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl UserStore for FlakyStore {
        async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.find(id).await
        }

        async fn find_by_username(&self, name: &Username) -> Result<Option<User>, StoreError> {
            self.inner.find_by_username(name).await
        }

        async fn list(&self) -> Result<Vec<User>, StoreError> {
            self.inner.list().await
        }

        async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
            self.inner.insert(user).await
        }

        async fn save(&self, user: &User) -> Result<(), StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("injected failure".to_owned()));
            }
            self.inner.save(user).await
        }
    }

    async fn seeded(store: &FlakyStore) -> User {
        let new_user = NewUser::new(
            Username::parse("editor").unwrap(),
            Email::parse("editor@site.test").unwrap(),
            None,
        )
        .with_assignments(BTreeSet::from([Role::Refinery]), vec![PluginName::baseline()]);
        store.inner.insert(new_user).await.unwrap()
    }

    #[tokio::test]
    async fn test_commit_applies_and_persists() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let store = FlakyStore::new(0);
        let mut target = seeded(&store).await;

        let plugins = strings(&[PluginName::BASELINE, "refinery_pages"]);
        let prepared = authorizer
            .prepare_update(&target, &strings(&["refinery", "superuser"]), Some(plugins.as_slice()), true)
            .unwrap();
        authorizer
            .commit(&store, &mut target, prepared, ProfileChanges::default())
            .await
            .unwrap();

        let stored = store.find(target.id).await.unwrap().unwrap();
        assert!(stored.is_superuser());
        assert_eq!(stored.plugins.len(), 2);
        assert_eq!(target.roles, stored.roles);
    }

    #[tokio::test]
    async fn test_rollback_restores_memento_after_failed_commit() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let store = FlakyStore::new(1);
        let mut target = seeded(&store).await;

        let plugins = strings(&["other_plugin"]);
        let prepared = authorizer
            .prepare_update(&target, &strings(&["superuser"]), Some(plugins.as_slice()), true)
            .unwrap();
        let expected = prepared.memento.clone();

        let failure = authorizer
            .commit(&store, &mut target, prepared, ProfileChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(failure.cause, StoreError::Unavailable(_)));

        authorizer
            .rollback(&store, &mut target, failure.memento)
            .await
            .unwrap();

        let stored = store.find(target.id).await.unwrap().unwrap();
        assert_eq!(&stored.roles, expected.roles());
        assert_eq!(stored.plugins, expected.plugins());
        assert_eq!(&target.roles, expected.roles());
        assert_eq!(target.plugins, expected.plugins());
    }

    #[tokio::test]
    async fn test_rollback_failure_is_fatal() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let store = FlakyStore::new(2);
        let mut target = seeded(&store).await;

        let prepared = authorizer
            .prepare_update(&target, &[], None, false)
            .unwrap();
        let failure = authorizer
            .commit(&store, &mut target, prepared, ProfileChanges::default())
            .await
            .unwrap_err();
        let err = authorizer
            .rollback(&store, &mut target, failure.memento)
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, UserAdminError::RollbackFailure { user_id, .. } if user_id == target.id));
    }

    #[tokio::test]
    async fn test_rollback_refuses_memento_of_another_user() {
        let registry = registry();
        let authorizer = UserAdminAuthorizer::new(&SETTINGS, &registry);
        let store = FlakyStore::new(0);
        let mut target = seeded(&store).await;
        let before = target.clone();

        let other = user(42, &[Role::Superuser], &["refinery_pages"]);
        let err = authorizer
            .rollback(&store, &mut target, Memento::capture(&other))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UserAdminError::MementoMismatch { user_id, memento_user_id }
                if user_id == target.id && memento_user_id == other.id
        ));
        assert!(err.is_fatal());
        assert_eq!(target, before);
        assert_eq!(store.find(target.id).await.unwrap().unwrap().roles, before.roles);
    }
}
