//! # sync-core
//!
//! Pure logic for mxsync (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms of the engine
//! without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`state`] decides which lifecycle transitions a task may perform
//! - [`window`] computes the visible range of a live timeline
//! - [`retry`] computes caller-level backoff delays
//!
//! The actual I/O (cache transactions, remote calls) is performed by
//! `sync-client`, which consults these modules before and after each step.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod retry;
pub mod state;
pub mod window;

pub use retry::RetryPolicy;
pub use state::{ResourceEvent, ResourceLifecycle, Transition, TransitionError};
pub use window::{LiveWindow, WindowRange, WindowSpec};
