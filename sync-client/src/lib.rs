//! # sync-client
//!
//! Client-side sync engine for mxsync.
//!
//! This is the library that applications use to keep a local cache of
//! remote resources consistent with the server and to follow local event
//! streams live.
//!
//! ## Features
//!
//! - **Tasks**: single-shot units of work, serialized per resource and
//!   cancellable, run on a bounded executor
//! - **Transactional cache**: scoped transactions that commit atomically or
//!   roll back on drop (in-memory and SQLite backends)
//! - **Remote abstraction**: pluggable remote service (mock included)
//! - **Live timelines**: tail-following windows with observer snapshots
//! - **Pure State Machine**: lifecycle rules come from sync-core
//!
//! ## Example
//!
//! ```ignore
//! use mxsync_client::{EngineConfig, MockRemote, SyncClient};
//!
//! let client = SyncClient::open(EngineConfig::default(), MockRemote::new()).await?;
//!
//! // Remove a push registration remotely and locally
//! client.remove_resource(id).await?;
//!
//! // Follow a room
//! let pager = client.live_timeline(StreamId::new("!room:example.org"));
//! pager.subscribe(|snapshot| println!("{} events", snapshot.len()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod remote;
pub mod store;
pub mod task;
pub mod timeline;

pub use client::SyncClient;
pub use config::{ConfigError, EngineConfig};
pub use remote::{MockRemote, RemoteError, RemoteService};
pub use store::{CacheStore, CacheTransaction, MemoryStore, SqliteStore, StoreError};
pub use task::{
    ConfirmedRemovals, RegisterResourceParams, RegisterResourceTask, RemoveResourceParams,
    RemoveResourceTask, Task, TaskCanceller, TaskError, TaskErrorKind, TaskExecutor, TaskFailure,
    TaskHandle,
};
pub use timeline::{EventStore, LivePager, NewEvent, StoreChange, SubscriptionHandle, WindowSnapshot};
