//! Error types for mxsync shared types.

use thiserror::Error;

/// Errors raised while parsing or validating shared types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// A persisted state column held an unknown value.
    #[error("invalid resource state: {0}")]
    InvalidState(String),

    /// A composite key component was empty.
    #[error("empty identity component: {0}")]
    EmptyComponent(&'static str),
}
