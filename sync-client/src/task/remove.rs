//! Resource removal task.
//!
//! Removes a resource on the remote side, then reconciles the local cache:
//!
//! 1. Read transaction: look the resource up; absent means `NotFound`.
//! 2. Check the lifecycle allows removal; capture a snapshot of the entity.
//! 3. Send a deletion request built from the snapshot.
//! 4. Write transaction: delete the cached entity (absent is a no-op).
//!
//! A remote failure leaves the cache untouched. A local failure after the
//! remote side confirmed yields `PartialReconciliation`, and the task
//! records the confirmation in its [`ConfirmedRemovals`] ledger so the next
//! removal of the same resource only repeats step 4. A registration of the
//! resource in between withdraws the confirmation.

use async_trait::async_trait;
use mxsync_core::{ResourceEvent, ResourceLifecycle, Transition};
use mxsync_types::{ResourceId, SetResourceRequest};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Task, TaskError};
use crate::remote::RemoteService;
use crate::store::{CacheStore, StoreError};

/// Parameters of one removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResourceParams {
    /// Resource to remove.
    pub id: ResourceId,
}

impl RemoveResourceParams {
    /// Remove the resource with this composite key.
    pub fn new(id: ResourceId) -> Self {
        Self { id }
    }
}

/// Resources whose remote removal was confirmed but whose local delete has
/// not succeeded yet.
///
/// The ledger lives in memory only. After a restart, removing such a
/// resource sends the remote deletion again.
#[derive(Debug, Default)]
pub struct ConfirmedRemovals {
    ids: Mutex<HashSet<ResourceId>>,
}

impl ConfirmedRemovals {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a remote removal of `id` is awaiting its local delete.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.ids().contains(id)
    }

    /// Forget the confirmation for `id`, returning whether one was recorded.
    pub fn withdraw(&self, id: &ResourceId) -> bool {
        self.ids().remove(id)
    }

    fn record(&self, id: &ResourceId) {
        self.ids().insert(id.clone());
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<ResourceId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a resource remotely and then from the local cache.
pub struct RemoveResourceTask<S, R> {
    store: Arc<S>,
    remote: Arc<R>,
    confirmed: Arc<ConfirmedRemovals>,
}

impl<S: CacheStore, R: RemoteService> RemoveResourceTask<S, R> {
    /// Create the task over a store and a remote service.
    pub fn new(store: Arc<S>, remote: Arc<R>) -> Self {
        Self {
            store,
            remote,
            confirmed: Arc::new(ConfirmedRemovals::new()),
        }
    }

    /// Ledger of confirmed removals, to share with tasks that supersede them.
    pub fn confirmed_removals(&self) -> Arc<ConfirmedRemovals> {
        self.confirmed.clone()
    }

    /// Whether a remote removal of `id` was confirmed but not yet applied
    /// locally.
    pub fn awaiting_reconciliation(&self, id: &ResourceId) -> bool {
        self.confirmed.contains(id)
    }

    async fn reconcile(&self, id: &ResourceId) -> Result<(), TaskError> {
        match self.delete_local(id).await {
            Ok(removed) => {
                self.confirmed.withdraw(id);
                if removed {
                    tracing::info!("Removed resource {}", id);
                } else {
                    tracing::debug!("Resource {} was already gone locally", id);
                }
                Ok(())
            }
            Err(source) => {
                self.confirmed.record(id);
                tracing::warn!(
                    "Resource {} removed remotely but local delete failed: {}",
                    id,
                    source
                );
                Err(TaskError::PartialReconciliation {
                    resource: id.clone(),
                    source,
                })
            }
        }
    }

    async fn delete_local(&self, id: &ResourceId) -> Result<bool, StoreError> {
        let mut txn = self.store.begin().await?;
        let removed = txn.delete_resource(id).await?;
        txn.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl<S: CacheStore, R: RemoteService> Task for RemoveResourceTask<S, R> {
    type Params = RemoveResourceParams;
    type Output = ();

    fn name(&self) -> &'static str {
        "remove-resource"
    }

    fn target(&self, params: &RemoveResourceParams) -> Option<ResourceId> {
        Some(params.id.clone())
    }

    async fn execute(&self, params: RemoveResourceParams) -> Result<(), TaskError> {
        let id = params.id;

        if self.awaiting_reconciliation(&id) {
            tracing::debug!("Remote removal of {} already confirmed, reconciling locally", id);
            return self.reconcile(&id).await;
        }

        let mut txn = self.store.begin().await?;
        let found = txn.find_resource(&id).await?;
        // Read-only: release without committing.
        drop(txn);
        let entity = found.ok_or_else(|| TaskError::NotFound(id.clone()))?;

        let invalid = |source| TaskError::InvalidState {
            resource: id.clone(),
            source,
        };
        let (requested, _) = ResourceLifecycle::from_state(entity.state)
            .on_event(ResourceEvent::RemovalRequested)
            .map_err(invalid)?;

        let request = SetResourceRequest::removal(&entity);
        tracing::debug!("Sending removal of {} to remote", id);
        if let Err(e) = self.remote.set_resource(&request).await {
            tracing::warn!("Remote removal of {} failed: {}", id, e);
            return Err(e.into());
        }

        match requested
            .on_event(ResourceEvent::RemovalConfirmed)
            .map_err(invalid)?
        {
            (_, Transition::Remove) => self.reconcile(&id).await,
            (_, Transition::Persist(state)) => Err(TaskError::Aborted(format!(
                "removal of {} confirmed but lifecycle kept it as {}",
                id, state
            ))),
        }
    }
}
