//! Error types for circuit breaker operations

use std::time::Duration;
use thiserror::Error;

/// Error returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute)
///
/// Keeps "the call was short-circuited" distinct from "the call ran and failed"
/// so callers and tests can tell the two apart.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Circuit is open, the operation was never attempted
    #[error("Circuit breaker '{name}' is open, retry after {retry_after:?}")]
    Open {
        /// Breaker name
        name: String,
        /// Time remaining until the next probe is admitted
        retry_after: Duration,
    },

    /// Operation exceeded the configured call timeout
    #[error("Circuit breaker '{name}' call timed out after {timeout:?}")]
    Timeout {
        /// Breaker name
        name: String,
        /// Configured per-call timeout
        timeout: Duration,
    },

    /// Operation ran and returned its own error
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the call was rejected without being attempted
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// True when the call was abandoned on timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// Underlying operation error, if the operation actually ran and failed
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(error) => Some(error),
            _ => None,
        }
    }
}

/// Snapshot persistence failures
///
/// Persistence is best effort; the breaker logs these and carries on.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error reading or writing the snapshot file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot exists but is too old to restore
    #[error("Snapshot is stale ({age_secs}s old)")]
    Stale {
        /// Snapshot age in seconds
        age_secs: i64,
    },
}
