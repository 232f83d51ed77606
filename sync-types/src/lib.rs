//! # sync-types
//!
//! Shared types for the mxsync synchronization engine.
//!
//! This crate provides the foundational types used across all mxsync crates:
//! - [`ResourceId`], [`StreamId`], [`Position`], [`TaskId`] - Identity and ordering types
//! - [`ResourceEntity`], [`ResourceState`] - Locally cached remote-facing resources
//! - [`SetResourceRequest`] - Payload of the remote "set resource" call
//! - [`TimelineEvent`] - Immutable entries of a local event stream
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
mod resource;

pub use error::TypesError;
pub use event::TimelineEvent;
pub use ids::{Position, ResourceId, StreamId, TaskId};
pub use resource::{
    ResourceData, ResourceEntity, ResourceState, SetResourceRequest, DEFAULT_RESOURCE_KIND,
};
