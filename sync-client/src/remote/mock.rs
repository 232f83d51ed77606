//! Mock remote service for testing.
//!
//! Captures every request, can be told to fail the next call, and can delay
//! calls to widen race windows in concurrency tests.

use super::{RemoteError, RemoteService};
use async_trait::async_trait;
use mxsync_types::SetResourceRequest;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Mock remote service for testing.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
    started: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    requests: Vec<SetResourceRequest>,
    fail_next: Option<RemoteError>,
    fail_always: Option<RemoteError>,
    delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

impl MockRemote {
    /// Create a new mock remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all requests that reached the remote side, in call order.
    pub fn requests(&self) -> Vec<SetResourceRequest> {
        self.lock().requests.clone()
    }

    /// Get the last request.
    pub fn last_request(&self) -> Option<SetResourceRequest> {
        self.lock().requests.last().cloned()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    /// Cause the next call to fail with the given error.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().fail_next = Some(error);
    }

    /// Fail every call with the given error until [`reset`](Self::reset).
    pub fn fail_always(&self, error: RemoteError) {
        self.lock().fail_always = Some(error);
    }

    /// Delay every call by the given duration before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Wait until a call has started.
    ///
    /// Each started call releases one waiter; a call that starts before
    /// anyone waits is remembered.
    pub async fn wait_call_started(&self) {
        self.started.notified().await;
    }

    /// Clear all state (requests, failures, delay).
    pub fn reset(&self) {
        *self.lock() = MockRemoteInner::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockRemoteInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn set_resource(&self, request: &SetResourceRequest) -> Result<(), RemoteError> {
        let (delay, failure) = {
            let mut inner = self.lock();
            inner.requests.push(request.clone());
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            let failure = inner.fail_next.take().or_else(|| inner.fail_always.clone());
            (inner.delay, failure)
        };
        self.started.notify_one();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.lock().in_flight -= 1;

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mxsync_types::{ResourceEntity, ResourceId, ResourceState};

    fn request() -> SetResourceRequest {
        SetResourceRequest::removal(&ResourceEntity::new(
            ResourceId::new("@a:b", "k", "app"),
            "en",
            ResourceState::Registered,
        ))
    }

    #[tokio::test]
    async fn records_requests() {
        let remote = MockRemote::new();
        remote.set_resource(&request()).await.unwrap();
        remote.set_resource(&request()).await.unwrap();

        assert_eq!(remote.call_count(), 2);
        assert_eq!(remote.last_request(), Some(request()));
    }

    #[tokio::test]
    async fn forced_failure_fires_once() {
        let remote = MockRemote::new();
        remote.fail_next(RemoteError::Timeout);

        assert_eq!(
            remote.set_resource(&request()).await,
            Err(RemoteError::Timeout)
        );
        assert!(remote.set_resource(&request()).await.is_ok());
        // Failed calls still reached the remote side
        assert_eq!(remote.call_count(), 2);
    }

    #[tokio::test]
    async fn persistent_failure_until_reset() {
        let remote = MockRemote::new();
        remote.fail_always(RemoteError::Network("offline".into()));

        assert!(remote.set_resource(&request()).await.is_err());
        assert!(remote.set_resource(&request()).await.is_err());
        remote.reset();
        assert!(remote.set_resource(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let remote = MockRemote::new();
        let clone = remote.clone();
        clone.set_resource(&request()).await.unwrap();
        assert_eq!(remote.call_count(), 1);
    }

    #[tokio::test]
    async fn tracks_concurrency() {
        let remote = MockRemote::new();
        remote.set_delay(Duration::from_millis(20));

        let a = remote.clone();
        let b = remote.clone();
        let (ra, rb) = tokio::join!(
            async move { a.set_resource(&request()).await },
            async move { b.set_resource(&request()).await }
        );
        ra.unwrap();
        rb.unwrap();
        assert_eq!(remote.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let remote = MockRemote::new();
        remote.set_resource(&request()).await.unwrap();
        remote.fail_next(RemoteError::Timeout);
        remote.reset();

        assert_eq!(remote.call_count(), 0);
        assert!(remote.set_resource(&request()).await.is_ok());
    }
}
