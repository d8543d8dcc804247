//! Credential store collaborator.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use userlink_core::{StoreError, User, UserId};

/// Primary user store, owner of every [`User`] record.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a new user and return the assigned id.
    ///
    /// Returns [`StoreError::Conflict`] when the username is taken.
    async fn save_user(&self, username: &str, password_hash: &[u8]) -> Result<UserId, StoreError>;

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError>;

    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError>;

    /// Every user id currently stored, ascending.
    async fn list_all_user_ids(&self) -> Result<Vec<UserId>, StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn save_user(&self, username: &str, password_hash: &[u8]) -> Result<UserId, StoreError> {
        (**self).save_user(username, password_hash).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        (**self).get_user_by_username(username).await
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        (**self).get_user_by_id(id).await
    }

    async fn list_all_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        (**self).list_all_user_ids().await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (**self).close().await
    }
}

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<UserId, User>,
    next_id: i64,
}

/// In-memory credential store for tests/dev.
///
/// Ids are assigned sequentially from 1. Cloning shares the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    inner: Arc<Mutex<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user with a fixed id (as if written by another process).
    pub fn insert_with_id(&self, user: User) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!("username {}", user.username)));
        }
        inner.next_id = inner.next_id.max(user.id.get());
        inner.users.insert(user.id, user);
        Ok(())
    }

    /// Simulate an unreachable backend: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::backend("credential store unavailable"));
        }
        self.inner
            .lock()
            .map_err(|_| StoreError::backend("credential store lock poisoned"))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn save_user(&self, username: &str, password_hash: &[u8]) -> Result<UserId, StoreError> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.username == username) {
            return Err(StoreError::Conflict(format!("username {username}")));
        }
        inner.next_id += 1;
        let id = UserId::new(inner.next_id);
        inner
            .users
            .insert(id, User::new(id, username, password_hash.to_vec()));
        Ok(id)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.lock()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", "username", username))
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.lock()?
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", "id", id))
    }

    async fn list_all_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self.lock()?.users.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_sequential_and_usernames_unique() {
        let store = InMemoryCredentialStore::new();
        assert_eq!(store.save_user("alice", b"h1").await.unwrap(), UserId::new(1));
        assert_eq!(store.save_user("bob", b"h2").await.unwrap(), UserId::new(2));

        let dup = store.save_user("alice", b"h3").await.unwrap_err();
        assert!(dup.is_conflict());
    }

    #[tokio::test]
    async fn seeded_ids_advance_the_sequence() {
        let store = InMemoryCredentialStore::new();
        store
            .insert_with_id(User::new(UserId::new(42), "carol", b"h".to_vec()))
            .unwrap();
        assert_eq!(store.save_user("dave", b"h").await.unwrap(), UserId::new(43));
        assert_eq!(
            store.list_all_user_ids().await.unwrap(),
            vec![UserId::new(42), UserId::new(43)]
        );
    }

    #[tokio::test]
    async fn lookups_report_not_found() {
        let store = InMemoryCredentialStore::new();
        assert!(matches!(
            store.get_user_by_username("ghost").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.get_user_by_id(UserId::new(9)).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unavailable_store_fails_with_backend_error() {
        let store = InMemoryCredentialStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.list_all_user_ids().await,
            Err(StoreError::Backend(_))
        ));
    }
}
