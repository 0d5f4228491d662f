//! In-process user store.
//!
//! Applies the same uniqueness rules as the `PostgreSQL` schema, so code
//! exercised against it sees the same validation failures.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use cms_users_core::{Email, UserId, Username};

use super::{StoreError, UserStore};
use crate::models::{FieldErrors, NewUser, User};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    last_id: i64,
}

impl Inner {
    /// Uniqueness errors for `username`/`email` against every user except `except`.
    fn conflicts(&self, username: &Username, email: &Email, except: Option<UserId>) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let others = self
            .users
            .values()
            .filter(|other| Some(other.id) != except);

        let key = username.key();
        let mut username_taken = false;
        let mut email_taken = false;
        for other in others {
            username_taken |= other.username.key() == key;
            email_taken |= other.email == *email;
        }

        if username_taken {
            errors.add("username", "has already been taken");
        }
        if email_taken {
            errors.add("email", "has already been taken");
        }
        errors
    }
}

/// User store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<User>, StoreError> {
        let key = username.key();
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|user| user.username.key() == key)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.inner.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.key().cmp(&b.username.key()).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .conflicts(&user.username, &user.email, None)
            .into_result()
            .map_err(StoreError::Validation)?;

        inner.last_id += 1;
        let now = Utc::now();
        let created = User {
            id: UserId::new(inner.last_id),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            roles: user.roles,
            plugins: user.plugins,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }

        inner
            .conflicts(&user.username, &user.email, Some(user.id))
            .into_result()
            .map_err(StoreError::Validation)?;

        let mut stored = user.clone();
        stored.updated_at = Utc::now();
        inner.users.insert(stored.id, stored);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use cms_users_core::{PluginName, Role};

    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser::new(
            Username::parse(username).unwrap(),
            Email::parse(email).unwrap(),
            None,
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = MemoryUserStore::new();
        let a = store.insert(new_user("alice", "alice@site.test")).await.unwrap();
        let b = store.insert(new_user("bob", "bob@site.test")).await.unwrap();

        assert_eq!(a.id, UserId::new(1));
        assert_eq!(b.id, UserId::new(2));
        assert!(a.roles.is_empty());
        assert!(a.plugins.is_empty());
    }

    #[tokio::test]
    async fn test_insert_stores_assignments() {
        let store = MemoryUserStore::new();
        let created = store
            .insert(new_user("alice", "alice@site.test").with_assignments(
                BTreeSet::from([Role::Refinery]),
                vec![PluginName::baseline()],
            ))
            .await
            .unwrap();

        let loaded = store.find(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.roles, BTreeSet::from([Role::Refinery]));
        assert_eq!(loaded.plugins, [PluginName::baseline()]);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_username_ignoring_case() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "alice@site.test")).await.unwrap();

        let err = store
            .insert(new_user("ALICE", "other@site.test"))
            .await
            .unwrap_err();

        match err {
            StoreError::Validation(errors) => {
                assert_eq!(errors.get("username"), ["has already been taken"]);
                assert!(errors.get("email").is_empty());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_save_persists_assignments() {
        let store = MemoryUserStore::new();
        let mut user = store.insert(new_user("alice", "alice@site.test")).await.unwrap();
        user.roles = BTreeSet::from([Role::Refinery, Role::Superuser]);
        user.plugins = vec![PluginName::baseline()];

        store.save(&user).await.unwrap();

        let loaded = store.find(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.roles, user.roles);
        assert_eq!(loaded.plugins, user.plugins);
    }

    #[tokio::test]
    async fn test_save_allows_keeping_own_email() {
        let store = MemoryUserStore::new();
        let mut user = store.insert(new_user("alice", "alice@site.test")).await.unwrap();
        user.full_name = Some("Alice".to_owned());

        assert!(store.save(&user).await.is_ok());
    }

    #[tokio::test]
    async fn test_save_rejects_email_of_another_user() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "alice@site.test")).await.unwrap();
        let mut bob = store.insert(new_user("bob", "bob@site.test")).await.unwrap();
        bob.email = Email::parse("alice@site.test").unwrap();

        assert!(matches!(
            store.save(&bob).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_save_unknown_user_is_not_found() {
        let store = MemoryUserStore::new();
        let mut ghost = store.insert(new_user("ghost", "ghost@site.test")).await.unwrap();
        ghost.id = UserId::new(99);

        assert!(matches!(store.save(&ghost).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_and_find_by_username() {
        let store = MemoryUserStore::new();
        store.insert(new_user("zed", "zed@site.test")).await.unwrap();
        store.insert(new_user("Amy", "amy@site.test")).await.unwrap();
        store.insert(new_user("bea", "bea@site.test")).await.unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username.to_string())
            .collect();
        assert_eq!(names, ["Amy", "bea", "zed"]);

        let found = store
            .find_by_username(&Username::parse("AMY").unwrap())
            .await
            .unwrap();
        assert_eq!(found.map(|u| u.id), Some(UserId::new(2)));
    }
}
