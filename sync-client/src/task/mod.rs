//! Tasks: single-shot asynchronous units of work.
//!
//! A task performs one logical operation against the cache store and the
//! remote service it was constructed with. Tasks are submitted to a
//! [`TaskExecutor`], which serializes tasks targeting the same resource and
//! runs everything else concurrently on a bounded pool.
//!
//! Tasks never retry on their own. Each step's failure short-circuits the
//! remaining steps and is returned to the caller as a [`TaskError`].

mod executor;
mod register;
mod remove;

pub use executor::{TaskCanceller, TaskExecutor, TaskHandle};
pub use register::{RegisterResourceParams, RegisterResourceTask};
pub use remove::{ConfirmedRemovals, RemoveResourceParams, RemoveResourceTask};

use async_trait::async_trait;
use mxsync_core::TransitionError;
use mxsync_types::ResourceId;
use std::fmt;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

/// A unit of work run by the [`TaskExecutor`].
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Input consumed by one execution.
    type Params: Send + 'static;
    /// Value produced on success.
    type Output: Send + 'static;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Resource this execution targets.
    ///
    /// Executions with the same target run one at a time, in submission
    /// order. `None` means the execution collides with nothing.
    fn target(&self, params: &Self::Params) -> Option<ResourceId>;

    /// Run the task to completion.
    async fn execute(&self, params: Self::Params) -> Result<Self::Output, TaskError>;
}

/// Task errors.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The targeted resource is not in the cache.
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// The resource is in a state that does not allow this operation.
    #[error("resource {resource} is in the wrong state: {source}")]
    InvalidState {
        /// Targeted resource.
        resource: ResourceId,
        /// Rejected transition.
        source: TransitionError,
    },

    /// The remote call failed. Nothing changed locally.
    #[error("remote failure: {0}")]
    Remote(#[from] RemoteError),

    /// A cache transaction failed. Nothing was committed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// The remote side applied the removal but the local delete failed.
    ///
    /// Retrying the removal only repeats the local delete.
    #[error("removal of {resource} confirmed remotely but not applied locally: {source}")]
    PartialReconciliation {
        /// Targeted resource.
        resource: ResourceId,
        /// Local failure.
        source: StoreError,
    },

    /// The task was cancelled before its result was delivered.
    #[error("task cancelled")]
    Cancelled,

    /// The task ended without producing a result.
    #[error("task aborted: {0}")]
    Aborted(String),
}

impl TaskError {
    /// Failure class of this error.
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            Self::NotFound(_) => TaskErrorKind::NotFound,
            Self::InvalidState { .. } => TaskErrorKind::InvalidState,
            Self::Remote(_) => TaskErrorKind::RemoteFailure,
            Self::Persistence(_) => TaskErrorKind::PersistenceFailure,
            Self::PartialReconciliation { .. } => TaskErrorKind::PartialReconciliation,
            Self::Cancelled => TaskErrorKind::Cancelled,
            Self::Aborted(_) => TaskErrorKind::Aborted,
        }
    }

    /// Whether resubmitting the same task may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote(_) | Self::Persistence(_) | Self::PartialReconciliation { .. }
        )
    }

    /// Whether a retry of this failure skips the remote step.
    pub fn retry_skips_remote(&self) -> bool {
        matches!(self, Self::PartialReconciliation { .. })
    }

    /// Consumer-facing summary that hides transport details.
    pub fn to_failure(&self) -> TaskFailure {
        let message = match self {
            Self::Remote(_) => "the server could not complete the request".to_string(),
            Self::Persistence(_) => "the local cache could not be updated".to_string(),
            Self::PartialReconciliation { resource, .. } => format!(
                "{} was removed remotely but is still cached; retry to finish",
                resource
            ),
            other => other.to_string(),
        };
        TaskFailure {
            kind: self.kind(),
            message,
        }
    }
}

/// Failure class of a [`TaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    /// See [`TaskError::NotFound`].
    NotFound,
    /// See [`TaskError::InvalidState`].
    InvalidState,
    /// See [`TaskError::Remote`].
    RemoteFailure,
    /// See [`TaskError::Persistence`].
    PersistenceFailure,
    /// See [`TaskError::PartialReconciliation`].
    PartialReconciliation,
    /// See [`TaskError::Cancelled`].
    Cancelled,
    /// See [`TaskError::Aborted`].
    Aborted,
}

impl TaskErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::RemoteFailure => "remote_failure",
            Self::PersistenceFailure => "persistence_failure",
            Self::PartialReconciliation => "partial_reconciliation",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What a consumer is told about a failed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Failure class.
    pub kind: TaskErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ResourceId {
        ResourceId::new("@alice:example.org", "k", "app")
    }

    #[test]
    fn kinds_have_stable_codes() {
        assert_eq!(TaskError::NotFound(id()).kind().code(), "not_found");
        assert_eq!(TaskError::Cancelled.kind().code(), "cancelled");
        assert_eq!(
            TaskError::Remote(RemoteError::Timeout).kind(),
            TaskErrorKind::RemoteFailure
        );
    }

    #[test]
    fn partial_reconciliation_is_retryable_without_remote() {
        let err = TaskError::PartialReconciliation {
            resource: id(),
            source: StoreError::Transaction("locked".into()),
        };
        assert!(err.is_retryable());
        assert!(err.retry_skips_remote());
    }

    #[test]
    fn remote_failure_retries_through_remote() {
        let err = TaskError::Remote(RemoteError::Network("reset".into()));
        assert!(err.is_retryable());
        assert!(!err.retry_skips_remote());
    }

    #[test]
    fn not_found_is_final() {
        assert!(!TaskError::NotFound(id()).is_retryable());
        assert!(!TaskError::Cancelled.is_retryable());
    }

    #[test]
    fn failure_hides_transport_details() {
        let err = TaskError::Remote(RemoteError::Server {
            status: 502,
            message: "upstream exploded at 10.0.0.3".into(),
        });
        let failure = err.to_failure();
        assert_eq!(failure.kind, TaskErrorKind::RemoteFailure);
        assert!(!failure.message.contains("10.0.0.3"));
        assert!(failure.to_string().starts_with("remote_failure: "));
    }

    #[test]
    fn failure_keeps_not_found_message() {
        let failure = TaskError::NotFound(id()).to_failure();
        assert_eq!(
            failure.message,
            "resource not found: @alice:example.org/app/k"
        );
    }
}
