//! Resource registration task.
//!
//! Marks the resource `REGISTERING` in the cache, sends the registration,
//! then settles the cached state on the outcome. Success gives `REGISTERED`.
//! On failure a previously `REGISTERED` entity is restored as it was, since
//! the remote side still holds it; anything else becomes `UNREGISTERED` with
//! the new attributes kept so the caller can retry.

use async_trait::async_trait;
use mxsync_core::{ResourceEvent, ResourceLifecycle, Transition};
use mxsync_types::{
    ResourceEntity, ResourceId, ResourceState, SetResourceRequest, DEFAULT_RESOURCE_KIND,
};
use std::sync::Arc;

use super::remove::ConfirmedRemovals;
use super::{Task, TaskError};
use crate::remote::RemoteService;
use crate::store::{CacheStore, CacheTransaction};

/// Parameters of one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResourceParams {
    /// Attributes to register. The state field is ignored.
    pub entity: ResourceEntity,
    /// Resource kind sent to the remote side.
    pub kind: String,
    /// Keep other resources with the same key on the remote side.
    pub append: bool,
}

impl RegisterResourceParams {
    /// Register `entity` with the default kind, replacing any remote copy.
    pub fn new(entity: ResourceEntity) -> Self {
        Self {
            entity,
            kind: DEFAULT_RESOURCE_KIND.to_string(),
            append: false,
        }
    }

    /// Set the resource kind.
    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    /// Set the append flag.
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

/// Registers a resource remotely and tracks it in the local cache.
pub struct RegisterResourceTask<S, R> {
    store: Arc<S>,
    remote: Arc<R>,
    confirmed: Arc<ConfirmedRemovals>,
}

impl<S: CacheStore, R: RemoteService> RegisterResourceTask<S, R> {
    /// Create the task over a store and a remote service.
    pub fn new(store: Arc<S>, remote: Arc<R>) -> Self {
        Self {
            store,
            remote,
            confirmed: Arc::new(ConfirmedRemovals::new()),
        }
    }

    /// Share the removal task's ledger so a registration withdraws any
    /// pending removal confirmation for the same resource.
    pub fn with_confirmed_removals(mut self, confirmed: Arc<ConfirmedRemovals>) -> Self {
        self.confirmed = confirmed;
        self
    }

    /// Apply `event` to the cached lifecycle of `entity` in one transaction.
    ///
    /// Returns the written entity and the one it replaced.
    async fn advance(
        &self,
        mut entity: ResourceEntity,
        event: ResourceEvent,
    ) -> Result<(ResourceEntity, Option<ResourceEntity>), TaskError> {
        let mut txn = self.store.begin().await?;
        let current = txn.find_resource(&entity.id).await?;
        let (_, transition) = ResourceLifecycle::from_optional(current.as_ref().map(|e| e.state))
            .on_event(event)
            .map_err(|source| TaskError::InvalidState {
                resource: entity.id.clone(),
                source,
            })?;

        apply(txn.as_mut(), &mut entity, transition).await?;
        txn.commit().await?;
        Ok((entity, current))
    }

    /// Settle a rejected registration.
    async fn roll_back(
        &self,
        pending: ResourceEntity,
        previous: Option<ResourceEntity>,
    ) -> Result<ResourceEntity, TaskError> {
        let event = ResourceEvent::RegisterFailed {
            previous: previous.as_ref().map(|e| e.state),
        };
        let entity = match previous {
            Some(prev) if prev.state == ResourceState::Registered => prev,
            _ => pending,
        };
        let (settled, _) = self.advance(entity, event).await?;
        Ok(settled)
    }
}

async fn apply(
    txn: &mut dyn CacheTransaction,
    entity: &mut ResourceEntity,
    transition: Transition,
) -> Result<(), TaskError> {
    match transition {
        Transition::Persist(state) => {
            entity.state = state;
            txn.put_resource(entity).await?;
        }
        Transition::Remove => {
            txn.delete_resource(&entity.id).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl<S: CacheStore, R: RemoteService> Task for RegisterResourceTask<S, R> {
    type Params = RegisterResourceParams;
    type Output = ResourceEntity;

    fn name(&self) -> &'static str {
        "register-resource"
    }

    fn target(&self, params: &RegisterResourceParams) -> Option<ResourceId> {
        Some(params.entity.id.clone())
    }

    async fn execute(&self, params: RegisterResourceParams) -> Result<ResourceEntity, TaskError> {
        let id = params.entity.id.clone();
        let (pending, previous) = self
            .advance(params.entity, ResourceEvent::RegisterRequested)
            .await?;
        tracing::debug!("Resource {} marked {}", id, pending.state);

        if self.confirmed.withdraw(&id) {
            tracing::debug!("Registration of {} supersedes a confirmed removal", id);
        }

        let request = SetResourceRequest::registration(&pending, &params.kind, params.append);
        match self.remote.set_resource(&request).await {
            Ok(()) => {
                let (registered, _) = self
                    .advance(pending, ResourceEvent::RegisterConfirmed)
                    .await?;
                tracing::info!("Registered resource {}", id);
                Ok(registered)
            }
            Err(e) => {
                tracing::warn!("Remote registration of {} failed: {}", id, e);
                match self.roll_back(pending, previous).await {
                    Ok(settled) => {
                        tracing::debug!("Resource {} settled as {}", id, settled.state)
                    }
                    Err(settle) => {
                        tracing::error!("Could not settle resource {}: {}", id, settle)
                    }
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockRemote, RemoteError};
    use crate::store::{read_resource, MemoryStore};
    use crate::task::TaskErrorKind;
    use mxsync_types::{ResourceData, ResourceState};

    fn id() -> ResourceId {
        ResourceId::new("@alice:example.org", "pushkey", "im.app")
    }

    fn entity(state: ResourceState) -> ResourceEntity {
        ResourceEntity::new(id(), "en", state)
            .with_app_display_name("App")
            .with_device_display_name("Phone")
            .with_data(ResourceData {
                url: Some("https://push.example.org/notify".into()),
                format: Some("event_id_only".into()),
            })
    }

    fn setup(
        entities: Vec<ResourceEntity>,
    ) -> (
        Arc<MemoryStore>,
        MockRemote,
        RegisterResourceTask<MemoryStore, MockRemote>,
    ) {
        let store = Arc::new(MemoryStore::with_resources(entities));
        let remote = MockRemote::new();
        let task = RegisterResourceTask::new(store.clone(), Arc::new(remote.clone()));
        (store, remote, task)
    }

    #[tokio::test]
    async fn new_resource_becomes_registered() {
        let (store, remote, task) = setup(vec![]);

        let registered = task
            .execute(RegisterResourceParams::new(entity(ResourceState::Unregistered)))
            .await
            .unwrap();

        assert_eq!(registered.state, ResourceState::Registered);
        assert_eq!(
            read_resource(store.as_ref(), &id()).await.unwrap(),
            Some(registered)
        );
        let request = remote.last_request().unwrap();
        assert_eq!(request.kind.as_deref(), Some(DEFAULT_RESOURCE_KIND));
        assert_eq!(request.device_display_name, "Phone");
        assert!(!request.append);
    }

    #[tokio::test]
    async fn kind_and_append_are_forwarded() {
        let (_, remote, task) = setup(vec![]);

        task.execute(
            RegisterResourceParams::new(entity(ResourceState::Unregistered))
                .with_kind("email")
                .with_append(true),
        )
        .await
        .unwrap();

        let request = remote.last_request().unwrap();
        assert_eq!(request.kind.as_deref(), Some("email"));
        assert!(request.append);
    }

    #[tokio::test]
    async fn remote_failure_leaves_resource_unregistered() {
        let (store, remote, task) = setup(vec![]);
        remote.fail_next(RemoteError::Network("connection reset".into()));

        let err = task
            .execute(RegisterResourceParams::new(entity(ResourceState::Unregistered)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), TaskErrorKind::RemoteFailure);
        let cached = read_resource(store.as_ref(), &id()).await.unwrap().unwrap();
        assert_eq!(cached.state, ResourceState::Unregistered);
        assert_eq!(cached.app_display_name.as_deref(), Some("App"));
    }

    #[tokio::test]
    async fn failed_reregistration_restores_previous_entity() {
        let original = entity(ResourceState::Registered);
        let (store, remote, task) = setup(vec![original.clone()]);
        remote.fail_next(RemoteError::Timeout);

        let updated = entity(ResourceState::Registered).with_profile_tag("work");
        let err = task
            .execute(RegisterResourceParams::new(updated))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), TaskErrorKind::RemoteFailure);
        assert_eq!(
            read_resource(store.as_ref(), &id()).await.unwrap(),
            Some(original)
        );
    }

    #[tokio::test]
    async fn failed_resumed_registration_is_unregistered() {
        let (store, remote, task) = setup(vec![entity(ResourceState::Registering)]);
        remote.fail_next(RemoteError::Timeout);

        task.execute(RegisterResourceParams::new(entity(ResourceState::Registering)))
            .await
            .unwrap_err();

        let cached = read_resource(store.as_ref(), &id()).await.unwrap().unwrap();
        assert_eq!(cached.state, ResourceState::Unregistered);
    }

    #[tokio::test]
    async fn reregistration_refreshes_attributes() {
        let (store, _, task) = setup(vec![entity(ResourceState::Registered)]);

        let updated = entity(ResourceState::Registered).with_profile_tag("work");
        task.execute(RegisterResourceParams::new(updated))
            .await
            .unwrap();

        let cached = read_resource(store.as_ref(), &id()).await.unwrap().unwrap();
        assert_eq!(cached.state, ResourceState::Registered);
        assert_eq!(cached.profile_tag.as_deref(), Some("work"));
    }

    #[tokio::test]
    async fn interrupted_registration_can_resume() {
        let (store, _, task) = setup(vec![entity(ResourceState::Registering)]);

        task.execute(RegisterResourceParams::new(entity(ResourceState::Registering)))
            .await
            .unwrap();

        let cached = read_resource(store.as_ref(), &id()).await.unwrap().unwrap();
        assert_eq!(cached.state, ResourceState::Registered);
    }

    #[tokio::test]
    async fn registration_rejected_while_removing() {
        let original = entity(ResourceState::Unregistering);
        let (store, remote, task) = setup(vec![original.clone()]);

        let err = task
            .execute(RegisterResourceParams::new(entity(ResourceState::Unregistered)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), TaskErrorKind::InvalidState);
        assert_eq!(remote.call_count(), 0);
        assert_eq!(
            read_resource(store.as_ref(), &id()).await.unwrap(),
            Some(original)
        );
    }

    #[tokio::test]
    async fn failed_pending_write_skips_remote() {
        let (store, remote, task) = setup(vec![]);
        store.fail_next_commit("disk full");

        let err = task
            .execute(RegisterResourceParams::new(entity(ResourceState::Unregistered)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), TaskErrorKind::PersistenceFailure);
        assert_eq!(remote.call_count(), 0);
        assert_eq!(read_resource(store.as_ref(), &id()).await.unwrap(), None);
    }
}
