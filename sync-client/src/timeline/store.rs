//! In-memory event store.

use mxsync_types::{Position, StreamId, TimelineEvent};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Capacity of the change channel. Slow listeners that fall further behind
/// see a lag error and must resynchronize from the store.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// An event about to be appended. The store assigns its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// Remote event identifier, if known.
    pub event_id: Option<String>,
    /// Sender identity.
    pub sender: String,
    /// Event body.
    pub body: String,
    /// Origin timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl NewEvent {
    /// Create an event without a remote identifier.
    pub fn new(sender: impl Into<String>, body: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            event_id: None,
            sender: sender.into(),
            body: body.into(),
            timestamp_ms,
        }
    }

    /// Attach a remote event identifier.
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }
}

/// Notification of an append to one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Stream that changed.
    pub stream_id: StreamId,
    /// First appended position.
    pub first: Position,
    /// Last appended position, the new tail.
    pub last: Position,
}

/// Append-only, in-memory store of event streams.
///
/// Positions start at 1 in every stream and increase by one per event.
#[derive(Debug)]
pub struct EventStore {
    streams: RwLock<HashMap<StreamId, Vec<TimelineEvent>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl EventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            streams: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Append a batch of events to a stream and return them with their
    /// assigned positions.
    ///
    /// The batch becomes visible atomically and is announced as one change.
    pub fn append(&self, stream_id: &StreamId, events: Vec<NewEvent>) -> Vec<TimelineEvent> {
        if events.is_empty() {
            return Vec::new();
        }

        let appended = {
            let mut streams = self.write();
            let stream = streams.entry(stream_id.clone()).or_default();
            let mut position = Position::new(stream.len() as u64);
            let appended: Vec<TimelineEvent> = events
                .into_iter()
                .map(|event| {
                    position = position.next();
                    TimelineEvent {
                        stream_id: stream_id.clone(),
                        position,
                        event_id: event.event_id,
                        sender: event.sender,
                        body: event.body,
                        timestamp_ms: event.timestamp_ms,
                    }
                })
                .collect();
            stream.extend(appended.iter().cloned());

            // Announce while still holding the lock so listeners see
            // changes in position order.
            if let (Some(first), Some(last)) = (appended.first(), appended.last()) {
                let _ = self.changes.send(StoreChange {
                    stream_id: stream_id.clone(),
                    first: first.position,
                    last: last.position,
                });
            }
            appended
        };

        tracing::debug!(
            "Appended {} event(s) to stream {}",
            appended.len(),
            stream_id
        );
        appended
    }

    /// Append a single event.
    pub fn append_one(&self, stream_id: &StreamId, event: NewEvent) -> TimelineEvent {
        let mut appended = self.append(stream_id, vec![event]);
        // append() returns exactly one event per input
        appended.remove(0)
    }

    /// Read the event at `position`.
    pub fn get(&self, stream_id: &StreamId, position: Position) -> Option<TimelineEvent> {
        let index = position.value().checked_sub(1)? as usize;
        self.read().get(stream_id)?.get(index).cloned()
    }

    /// Read events with positions in `from..=to`, oldest first.
    ///
    /// The range is clipped to the events that exist.
    pub fn range(&self, stream_id: &StreamId, from: Position, to: Position) -> Vec<TimelineEvent> {
        let streams = self.read();
        let Some(stream) = streams.get(stream_id) else {
            return Vec::new();
        };
        let start = from.value().max(1) as usize - 1;
        let end = (to.value() as usize).min(stream.len());
        if start >= end {
            return Vec::new();
        }
        stream[start..end].to_vec()
    }

    /// Position of the newest event, [`Position::zero`] for an empty stream.
    pub fn tail(&self, stream_id: &StreamId) -> Position {
        Position::new(self.len(stream_id) as u64)
    }

    /// Number of events in a stream.
    pub fn len(&self, stream_id: &StreamId) -> usize {
        self.read().get(stream_id).map(Vec::len).unwrap_or(0)
    }

    /// Check if a stream has no events.
    pub fn is_empty(&self, stream_id: &StreamId) -> bool {
        self.len(stream_id) == 0
    }

    /// Subscribe to append notifications for every stream.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<StreamId, Vec<TimelineEvent>>> {
        self.streams
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<StreamId, Vec<TimelineEvent>>> {
        self.streams
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamId {
        StreamId::new("!room:example.org")
    }

    fn seed(store: &EventStore, count: usize) {
        let events = (1..=count)
            .map(|i| NewEvent::new("@alice:example.org", format!("e{}", i), i as u64))
            .collect();
        store.append(&stream(), events);
    }

    #[test]
    fn positions_start_at_one_and_increase() {
        let store = EventStore::new();
        let appended = store.append(
            &stream(),
            vec![NewEvent::new("@a:b", "one", 1), NewEvent::new("@a:b", "two", 2)],
        );
        assert_eq!(appended[0].position, Position::new(1));
        assert_eq!(appended[1].position, Position::new(2));

        let third = store.append_one(&stream(), NewEvent::new("@a:b", "three", 3));
        assert_eq!(third.position, Position::new(3));
        assert_eq!(store.tail(&stream()), Position::new(3));
    }

    #[test]
    fn streams_are_independent() {
        let store = EventStore::new();
        seed(&store, 3);
        let other = StreamId::new("!other:example.org");
        let first = store.append_one(&other, NewEvent::new("@a:b", "x", 1));

        assert_eq!(first.position, Position::new(1));
        assert_eq!(store.len(&stream()), 3);
        assert_eq!(store.len(&other), 1);
    }

    #[test]
    fn point_read() {
        let store = EventStore::new();
        seed(&store, 3);

        assert_eq!(store.get(&stream(), Position::new(2)).unwrap().body, "e2");
        assert!(store.get(&stream(), Position::zero()).is_none());
        assert!(store.get(&stream(), Position::new(4)).is_none());
        assert!(store
            .get(&StreamId::new("!missing:example.org"), Position::new(1))
            .is_none());
    }

    #[test]
    fn range_read_is_inclusive_and_clipped() {
        let store = EventStore::new();
        seed(&store, 10);

        let bodies: Vec<String> = store
            .range(&stream(), Position::new(6), Position::new(10))
            .into_iter()
            .map(|e| e.body)
            .collect();
        assert_eq!(bodies, vec!["e6", "e7", "e8", "e9", "e10"]);

        assert_eq!(
            store.range(&stream(), Position::zero(), Position::new(100)).len(),
            10
        );
        assert!(store
            .range(&stream(), Position::new(8), Position::new(7))
            .is_empty());
    }

    #[test]
    fn empty_stream() {
        let store = EventStore::new();
        assert!(store.is_empty(&stream()));
        assert_eq!(store.tail(&stream()), Position::zero());
        assert!(store.append(&stream(), Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn appends_are_announced() {
        let store = EventStore::new();
        let mut changes = store.subscribe_changes();
        seed(&store, 3);

        let change = changes.recv().await.unwrap();
        assert_eq!(
            change,
            StoreChange {
                stream_id: stream(),
                first: Position::new(1),
                last: Position::new(3),
            }
        );
    }
}
