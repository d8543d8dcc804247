use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use userlink_core::{StoreError, UserId};

/// Replica of known user ids.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    async fn exists_user_id(&self, id: UserId) -> Result<bool, StoreError>;

    /// Insert `id`. Returns [`StoreError::Conflict`] if it is already present.
    async fn insert_user_id(&self, id: UserId) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<R> ReplicaStore for Arc<R>
where
    R: ReplicaStore + ?Sized,
{
    async fn exists_user_id(&self, id: UserId) -> Result<bool, StoreError> {
        (**self).exists_user_id(id).await
    }

    async fn insert_user_id(&self, id: UserId) -> Result<(), StoreError> {
        (**self).insert_user_id(id).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        (**self).close().await
    }
}

/// In-memory replica store for tests/dev. Cloning shares the same set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReplicaStore {
    ids: Arc<Mutex<BTreeSet<UserId>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.ids.lock().map(|ids| ids.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeSet<UserId>>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::backend("replica store unavailable"));
        }
        self.ids
            .lock()
            .map_err(|_| StoreError::backend("replica store lock poisoned"))
    }
}

#[async_trait]
impl ReplicaStore for InMemoryReplicaStore {
    async fn exists_user_id(&self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.lock()?.contains(&id))
    }

    async fn insert_user_id(&self, id: UserId) -> Result<(), StoreError> {
        if !self.lock()?.insert(id) {
            return Err(StoreError::Conflict(format!("user_id {id}")));
        }
        Ok(())
    }
}
