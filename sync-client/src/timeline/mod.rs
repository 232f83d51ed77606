//! Local event streams and live, tail-following views over them.
//!
//! - [`EventStore`] holds append-only streams of [`TimelineEvent`]s and
//!   announces every append on a broadcast channel.
//! - [`LivePager`] binds to one stream, keeps a window over its newest
//!   events, and pushes an immutable [`WindowSnapshot`] to its observers
//!   whenever the window changes.
//!
//! [`TimelineEvent`]: mxsync_types::TimelineEvent

mod pager;
mod store;

pub use pager::{LivePager, SubscriptionHandle, WindowSnapshot};
pub use store::{EventStore, NewEvent, StoreChange};
