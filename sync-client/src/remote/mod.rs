//! Remote service adapter boundary.
//!
//! The adapter performs one request/response call per operation against the
//! remote API. It holds no cache and never retries: retries are a caller
//! decision layered on top of tasks.
//!
//! # Example
//!
//! ```ignore
//! let remote = MockRemote::new();
//! remote.set_resource(&SetResourceRequest::removal(&entity)).await?;
//! assert_eq!(remote.call_count(), 1);
//! ```

mod mock;

pub use mock::MockRemote;

use async_trait::async_trait;
use mxsync_types::SetResourceRequest;
use thiserror::Error;

/// Remote call errors.
///
/// The cause is kept opaque; callers only learn which class of failure
/// occurred and a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with an error.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP-like status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,
}

/// Remote API used by resource tasks.
///
/// Responses are all-or-nothing: an `Ok` means the remote side applied the
/// whole request, an `Err` means it applied none of it.
#[async_trait]
pub trait RemoteService: Send + Sync + 'static {
    /// Create, update, or (with `kind == None`) delete a resource.
    async fn set_resource(&self, request: &SetResourceRequest) -> Result<(), RemoteError>;
}
