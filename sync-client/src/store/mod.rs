//! Local cache store for mxsync.
//!
//! The cache is accessed only through scoped transactions (a unit of work):
//!
//! - `begin()` acquires a transaction, waiting if another one holds the data
//! - reads and writes go through the transaction
//! - `commit()` applies every write atomically
//! - dropping the transaction without committing rolls it back
//!
//! Because rollback happens on drop, every exit path (early return, `?`,
//! panic, or a cancelled future) releases the transaction without leaving
//! partial writes behind.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use mxsync_types::{ResourceEntity, ResourceId, TypesError};
use thiserror::Error;

/// Cache store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(#[from] TypesError),

    /// The transaction could not be completed.
    #[error("transaction failed: {0}")]
    Transaction(String),
}

/// A scoped cache transaction.
///
/// Writes become visible to other transactions only after [`commit`].
/// Dropping the transaction discards them.
///
/// [`commit`]: CacheTransaction::commit
#[async_trait]
pub trait CacheTransaction: Send {
    /// Look up a resource by composite key.
    async fn find_resource(&mut self, id: &ResourceId)
        -> Result<Option<ResourceEntity>, StoreError>;

    /// All resources belonging to an owner, ordered by app id then key.
    async fn resources_for_owner(
        &mut self,
        owner_id: &str,
    ) -> Result<Vec<ResourceEntity>, StoreError>;

    /// Insert or replace a resource.
    async fn put_resource(&mut self, entity: &ResourceEntity) -> Result<(), StoreError>;

    /// Delete a resource if present.
    ///
    /// Returns `true` if a row was deleted. Deleting an absent resource is
    /// not an error.
    async fn delete_resource(&mut self, id: &ResourceId) -> Result<bool, StoreError>;

    /// Atomically apply all writes made through this transaction.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// A transactional cache backend.
///
/// Implementations decide how transactions are isolated; both bundled
/// backends serialize them, so transactions touching the same key are
/// always linearized.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Begin a new transaction.
    async fn begin(&self) -> Result<Box<dyn CacheTransaction>, StoreError>;
}

/// Read a single resource in its own short transaction.
pub async fn read_resource<S: CacheStore + ?Sized>(
    store: &S,
    id: &ResourceId,
) -> Result<Option<ResourceEntity>, StoreError> {
    let mut txn = store.begin().await?;
    let entity = txn.find_resource(id).await?;
    txn.commit().await?;
    Ok(entity)
}

/// List an owner's resources in their own short transaction.
pub async fn list_resources<S: CacheStore + ?Sized>(
    store: &S,
    owner_id: &str,
) -> Result<Vec<ResourceEntity>, StoreError> {
    let mut txn = store.begin().await?;
    let entities = txn.resources_for_owner(owner_id).await?;
    txn.commit().await?;
    Ok(entities)
}
