//! SyncClient - the main interface for mxsync.
//!
//! [`SyncClient`] wires a cache store, a remote service and a task executor
//! together and exposes the resource operations plus live timelines.
//!
//! # Architecture
//!
//! ```text
//! Application → SyncClient → TaskExecutor → Task ──► CacheStore (transactions)
//!                   │                          │
//!                   │                          └──► RemoteService
//!                   └──► EventStore ◄── LivePager ──► observers
//! ```
//!
//! Every resource operation is a task. Tasks on the same resource run one
//! at a time in submission order; the lifecycle rules come from the pure
//! state machine in sync-core.
//!
//! # Example
//!
//! ```ignore
//! use mxsync_client::{EngineConfig, MemoryStore, MockRemote, SyncClient};
//!
//! let client = SyncClient::new(EngineConfig::default(), MemoryStore::new(), MockRemote::new());
//! client.register_resource(RegisterResourceParams::new(entity)).await?;
//! client.remove_resource(id).await?;
//! ```

use mxsync_core::RetryPolicy;
use mxsync_types::{ResourceEntity, ResourceId, StreamId};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::remote::RemoteService;
use crate::store::{self, CacheStore, SqliteStore, StoreError};
use crate::task::{
    RegisterResourceParams, RegisterResourceTask, RemoveResourceParams, RemoveResourceTask,
    TaskError, TaskExecutor, TaskHandle,
};
use crate::timeline::{EventStore, LivePager};

/// Client facade over the cache, the remote service and the timelines.
pub struct SyncClient<S: CacheStore, R: RemoteService> {
    config: EngineConfig,
    store: Arc<S>,
    executor: TaskExecutor,
    register: Arc<RegisterResourceTask<S, R>>,
    remove: Arc<RemoveResourceTask<S, R>>,
    events: Arc<EventStore>,
}

impl<S: CacheStore, R: RemoteService> SyncClient<S, R> {
    /// Create a client over an existing store and remote service.
    pub fn new(config: EngineConfig, store: S, remote: R) -> Self {
        let store = Arc::new(store);
        let remote = Arc::new(remote);
        let executor = TaskExecutor::new(config.executor.max_concurrent_tasks);
        let remove = RemoveResourceTask::new(store.clone(), remote.clone());
        let register = RegisterResourceTask::new(store.clone(), remote)
            .with_confirmed_removals(remove.confirmed_removals());
        Self {
            register: Arc::new(register),
            remove: Arc::new(remove),
            executor,
            store,
            events: Arc::new(EventStore::new()),
            config,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Task executor used for every resource operation.
    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    /// Register (or re-register) a resource.
    ///
    /// Resolves with the cached entity in its final state.
    pub fn register_resource(&self, params: RegisterResourceParams) -> TaskHandle<ResourceEntity> {
        self.executor.submit(self.register.clone(), params)
    }

    /// Remove a resource remotely and from the cache.
    pub fn remove_resource(&self, id: ResourceId) -> TaskHandle<()> {
        self.executor
            .submit(self.remove.clone(), RemoveResourceParams::new(id))
    }

    /// Remove a resource, resubmitting retryable failures under `policy`.
    ///
    /// A retry after `PartialReconciliation` only repeats the local delete,
    /// so the remote side sees at most one successful removal.
    pub async fn remove_resource_with_retry(
        &self,
        id: ResourceId,
        policy: &RetryPolicy,
    ) -> Result<(), TaskError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.remove_resource(id.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && policy.should_retry(attempts) => {
                    let delay = policy.delay_for_attempt(attempts - 1);
                    tracing::warn!(
                        "Removal of {} failed (attempt {}/{}): {}; retrying in {:?}",
                        id,
                        attempts,
                        policy.max_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Request cancellation of a submitted task.
    pub fn cancel<T>(&self, handle: &TaskHandle<T>) {
        self.executor.cancel(handle);
    }

    /// Read one cached resource.
    pub async fn resource(&self, id: &ResourceId) -> Result<Option<ResourceEntity>, StoreError> {
        store::read_resource(self.store.as_ref(), id).await
    }

    /// List an owner's cached resources.
    pub async fn resources(&self, owner_id: &str) -> Result<Vec<ResourceEntity>, StoreError> {
        store::list_resources(self.store.as_ref(), owner_id).await
    }

    /// Local event store backing the timelines.
    pub fn events(&self) -> &Arc<EventStore> {
        &self.events
    }

    /// Bind a live pager to a stream using the configured window sizes.
    pub fn live_timeline(&self, stream_id: StreamId) -> LivePager {
        LivePager::bind(self.events.clone(), stream_id, self.config.window_spec())
    }
}

impl<R: RemoteService> SyncClient<SqliteStore, R> {
    /// Open a client over the SQLite cache named in `config`.
    ///
    /// Without a configured database path the cache lives in memory.
    pub async fn open(config: EngineConfig, remote: R) -> Result<Self, StoreError> {
        let store = match &config.storage.database {
            Some(path) => SqliteStore::open(path).await?,
            None => SqliteStore::in_memory().await?,
        };
        Ok(Self::new(config, store, remote))
    }
}
