//! Live pager over one event stream.
//!
//! The pager owns a [`LiveWindow`] and a background listener. The listener
//! is the only place the window changes: it reacts to store appends (the
//! window follows the tail) and to "load more" requests (the window grows
//! backward), and after every change publishes a new immutable
//! [`WindowSnapshot`] to all active observers.
//!
//! ```text
//!   EventStore ──StoreChange──►┐
//!                              ├──► listener ──► LiveWindow ──► WindowSnapshot ──► observers
//!   load_more() ──Command─────►┘
//! ```
//!
//! Observers never see a partially updated window and never see an older
//! snapshot after a newer one.

use mxsync_core::{LiveWindow, WindowRange, WindowSpec};
use mxsync_types::{Position, StreamId, TimelineEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::store::{EventStore, StoreChange};

/// Immutable view of a live window at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Stream the window belongs to.
    pub stream_id: StreamId,
    /// Visible events, oldest first.
    pub events: Vec<TimelineEvent>,
    /// Visible positions, `None` while the stream is empty.
    pub range: Option<WindowRange>,
    /// Whether older events exist before the window.
    pub has_more_backward: bool,
    /// Increases with every published snapshot of this pager.
    pub version: u64,
}

impl WindowSnapshot {
    /// Number of visible events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if no events are visible.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Returned by [`LivePager::subscribe`]; pass it to
/// [`LivePager::unsubscribe`] to stop deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
}

type Observer = Box<dyn Fn(Arc<WindowSnapshot>) + Send + Sync>;

struct Subscription {
    id: u64,
    observer: Observer,
    active: AtomicBool,
    last_version: AtomicU64,
}

impl Subscription {
    fn deliver(&self, snapshot: &Arc<WindowSnapshot>) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        let previous = self.last_version.fetch_max(snapshot.version, Ordering::AcqRel);
        if previous >= snapshot.version {
            return;
        }
        (self.observer)(snapshot.clone());
    }
}

struct Shared {
    current: RwLock<Arc<WindowSnapshot>>,
    subscriptions: Mutex<Vec<Arc<Subscription>>>,
}

impl Shared {
    fn current(&self) -> Arc<WindowSnapshot> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Subscription>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn publish(&self, snapshot: WindowSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = snapshot.clone();

        let subscriptions = self.subscriptions().clone();
        for subscription in subscriptions {
            subscription.deliver(&snapshot);
        }
    }
}

enum Command {
    Subscribe(Arc<Subscription>),
    LoadMore(oneshot::Sender<bool>),
}

/// Tail-following pager bound to one stream.
///
/// Dropping the pager (or calling [`close`](LivePager::close)) stops the
/// listener; observers receive nothing afterwards. Binding a new pager to
/// the same stream starts again at the store's current tail.
pub struct LivePager {
    stream_id: StreamId,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    next_subscription: AtomicU64,
    listener: JoinHandle<()>,
}

impl std::fmt::Debug for LivePager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePager")
            .field("stream_id", &self.stream_id)
            .field("version", &self.shared.current().version)
            .finish_non_exhaustive()
    }
}

impl LivePager {
    /// Bind a pager to a stream and start following it.
    ///
    /// The first snapshot is available immediately. Must be called from
    /// within a tokio runtime.
    pub fn bind(store: Arc<EventStore>, stream_id: StreamId, spec: WindowSpec) -> Self {
        // Subscribe before reading the tail so no append falls in between.
        let changes = store.subscribe_changes();
        let tail = store.tail(&stream_id);
        let window = LiveWindow::new(spec);
        let initial = build_snapshot(&store, &stream_id, &window, tail, 1);

        let shared = Arc::new(Shared {
            current: RwLock::new(Arc::new(initial)),
            subscriptions: Mutex::new(Vec::new()),
        });
        let (commands, command_rx) = mpsc::unbounded_channel();

        let listener = Listener {
            stream_id: stream_id.clone(),
            store,
            window,
            tail,
            version: 1,
            shared: shared.clone(),
        };
        let listener = tokio::spawn(listener.run(changes, command_rx));

        tracing::debug!("Bound live pager to stream {} at tail {}", stream_id, tail);
        Self {
            stream_id,
            shared,
            commands,
            next_subscription: AtomicU64::new(1),
            listener,
        }
    }

    /// Stream this pager follows.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Register an observer.
    ///
    /// The observer is called with the current snapshot right away and
    /// then with every later one, always from the pager's listener task.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionHandle
    where
        F: Fn(Arc<WindowSnapshot>) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription {
            id,
            observer: Box::new(observer),
            active: AtomicBool::new(true),
            last_version: AtomicU64::new(0),
        });
        self.shared.subscriptions().push(subscription.clone());
        let _ = self.commands.send(Command::Subscribe(subscription));
        SubscriptionHandle { id }
    }

    /// Stop deliveries to an observer.
    ///
    /// Returns `false` if the handle was not subscribed. A delivery already
    /// in progress may still complete. The store is not affected.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscriptions = self.shared.subscriptions();
        match subscriptions.iter().position(|s| s.id == handle.id) {
            Some(index) => {
                let subscription = subscriptions.remove(index);
                subscription.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Number of active observers.
    pub fn observer_count(&self) -> usize {
        self.shared.subscriptions().len()
    }

    /// Grow the window backward by one page.
    ///
    /// Returns `true` if the window grew; observers then receive the new
    /// snapshot. Returns `false` at the start of the stream, at the window
    /// cap, or after the pager was closed.
    pub async fn load_more(&self) -> bool {
        let (reply, grew) = oneshot::channel();
        if self.commands.send(Command::LoadMore(reply)).is_err() {
            return false;
        }
        grew.await.unwrap_or(false)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<WindowSnapshot> {
        self.shared.current()
    }

    /// Whether older events exist before the current window.
    pub fn has_more_backward(&self) -> bool {
        self.shared.current().has_more_backward
    }

    /// Stop following the stream.
    pub fn close(self) {
        // Drop does the work.
    }
}

impl Drop for LivePager {
    fn drop(&mut self) {
        self.listener.abort();
        tracing::debug!("Closed live pager on stream {}", self.stream_id);
    }
}

struct Listener {
    stream_id: StreamId,
    store: Arc<EventStore>,
    window: LiveWindow,
    tail: Position,
    version: u64,
    shared: Arc<Shared>,
}

impl Listener {
    async fn run(
        mut self,
        mut changes: broadcast::Receiver<StoreChange>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Subscribe(subscription)) => {
                        subscription.deliver(&self.shared.current());
                    }
                    Some(Command::LoadMore(reply)) => {
                        let grew = self.window.load_more(self.tail);
                        if grew {
                            self.publish();
                        }
                        let _ = reply.send(grew);
                    }
                    None => break,
                },
                change = changes.recv() => match change {
                    Ok(change) => {
                        if change.stream_id == self.stream_id
                            && self.window.affected_by_append(self.tail, change.last)
                        {
                            self.tail = change.last;
                            self.publish();
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Live pager on {} missed {} change(s), resynchronizing",
                            self.stream_id,
                            skipped
                        );
                        let tail = self.store.tail(&self.stream_id);
                        if tail != self.tail {
                            self.tail = tail;
                            self.publish();
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("Live pager listener for {} stopped", self.stream_id);
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = build_snapshot(
            &self.store,
            &self.stream_id,
            &self.window,
            self.tail,
            self.version,
        );
        self.shared.publish(snapshot);
    }
}

fn build_snapshot(
    store: &EventStore,
    stream_id: &StreamId,
    window: &LiveWindow,
    tail: Position,
    version: u64,
) -> WindowSnapshot {
    let range = window.range(tail);
    let events = range
        .map(|r| store.range(stream_id, r.start, r.end))
        .unwrap_or_default();
    WindowSnapshot {
        stream_id: stream_id.clone(),
        events,
        range,
        has_more_backward: window.has_more_backward(tail),
        version,
    }
}
