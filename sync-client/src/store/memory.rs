//! In-memory cache store.
//!
//! Each transaction takes exclusive ownership of the tables, works on a
//! staged copy, and writes the copy back on commit. Fault injection hooks
//! allow tests to make the next delete or commit fail.

use super::{CacheStore, CacheTransaction, StoreError};
use async_trait::async_trait;
use mxsync_types::{ResourceEntity, ResourceId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Clone, Default)]
struct Tables {
    resources: BTreeMap<ResourceId, ResourceEntity>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_next_delete: Option<String>,
    fail_next_commit: Option<String>,
}

/// In-memory transactional store.
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<tokio::sync::Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with resources.
    pub fn with_resources(entities: impl IntoIterator<Item = ResourceEntity>) -> Self {
        let resources = entities
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect::<BTreeMap<_, _>>();
        Self {
            tables: Arc::new(tokio::sync::Mutex::new(Tables { resources })),
            faults: Arc::default(),
        }
    }

    /// Cause the next `delete_resource()` to fail with the given error.
    pub fn fail_next_delete(&self, error: &str) {
        self.lock_faults().fail_next_delete = Some(error.to_string());
    }

    /// Cause the next `commit()` to fail with the given error.
    pub fn fail_next_commit(&self, error: &str) {
        self.lock_faults().fail_next_commit = Some(error.to_string());
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn CacheTransaction>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryTransaction {
    fn take_fault(&self, pick: impl FnOnce(&mut Faults) -> Option<String>) -> Option<String> {
        let mut faults = self
            .faults
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pick(&mut faults)
    }
}

#[async_trait]
impl CacheTransaction for MemoryTransaction {
    async fn find_resource(
        &mut self,
        id: &ResourceId,
    ) -> Result<Option<ResourceEntity>, StoreError> {
        Ok(self.staged.resources.get(id).cloned())
    }

    async fn resources_for_owner(
        &mut self,
        owner_id: &str,
    ) -> Result<Vec<ResourceEntity>, StoreError> {
        let mut entities: Vec<ResourceEntity> = self
            .staged
            .resources
            .values()
            .filter(|e| e.id.owner_id() == owner_id)
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            (a.id.app_id(), a.id.key()).cmp(&(b.id.app_id(), b.id.key()))
        });
        Ok(entities)
    }

    async fn put_resource(&mut self, entity: &ResourceEntity) -> Result<(), StoreError> {
        self.staged
            .resources
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn delete_resource(&mut self, id: &ResourceId) -> Result<bool, StoreError> {
        if let Some(error) = self.take_fault(|f| f.fail_next_delete.take()) {
            return Err(StoreError::Transaction(error));
        }
        Ok(self.staged.resources.remove(id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(error) = self.take_fault(|f| f.fail_next_commit.take()) {
            return Err(StoreError::Transaction(error));
        }
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxsync_types::ResourceState;

    fn entity(key: &str, state: ResourceState) -> ResourceEntity {
        ResourceEntity::new(ResourceId::new("@alice:example.org", key, "app"), "en", state)
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let e = entity("k1", ResourceState::Registered);

        let mut txn = store.begin().await.unwrap();
        txn.put_resource(&e).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.find_resource(&e.id).await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let e = entity("k1", ResourceState::Registered);

        {
            let mut txn = store.begin().await.unwrap();
            txn.put_resource(&e).await.unwrap();
            // dropped without commit
        }

        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.find_resource(&e.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_commit_rolls_back() {
        let e = entity("k1", ResourceState::Registered);
        let store = MemoryStore::with_resources([e.clone()]);
        store.fail_next_commit("disk full");

        let mut txn = store.begin().await.unwrap();
        assert!(txn.delete_resource(&e.id).await.unwrap());
        let err = txn.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Transaction(msg) if msg == "disk full"));

        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.find_resource(&e.id).await.unwrap(), Some(e));
    }

    #[tokio::test]
    async fn delete_of_absent_is_noop() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        let removed = txn
            .delete_resource(&ResourceId::new("@a:b", "missing", "app"))
            .await
            .unwrap();
        assert!(!removed);
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn injected_delete_failure_fires_once() {
        let e = entity("k1", ResourceState::Registered);
        let store = MemoryStore::with_resources([e.clone()]);
        store.fail_next_delete("locked");

        let mut txn = store.begin().await.unwrap();
        assert!(txn.delete_resource(&e.id).await.is_err());
        assert!(txn.delete_resource(&e.id).await.unwrap());
    }

    #[tokio::test]
    async fn resources_for_owner_filters_and_orders() {
        let store = MemoryStore::with_resources([
            entity("b", ResourceState::Registered),
            entity("a", ResourceState::Registering),
            ResourceEntity::new(
                ResourceId::new("@bob:example.org", "x", "app"),
                "en",
                ResourceState::Registered,
            ),
        ]);

        let mut txn = store.begin().await.unwrap();
        let keys: Vec<String> = txn
            .resources_for_owner("@alice:example.org")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id.key().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn second_transaction_waits_for_first() {
        let store = MemoryStore::new();
        let first = store.begin().await.unwrap();

        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), store.begin());
        assert!(pending.await.is_err(), "second begin must wait");

        drop(first);
        assert!(store.begin().await.is_ok());
    }
}
