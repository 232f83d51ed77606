//! Timeline events.

use serde::{Deserialize, Serialize};

use crate::{Position, StreamId};

/// An immutable event stored in a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Stream this event belongs to.
    pub stream_id: StreamId,
    /// Store-assigned position within the stream.
    pub position: Position,
    /// Remote event identifier, if the event came from the server.
    pub event_id: Option<String>,
    /// Sender identity.
    pub sender: String,
    /// Event body.
    pub body: String,
    /// Origin timestamp in milliseconds (informational only).
    pub timestamp_ms: u64,
}
