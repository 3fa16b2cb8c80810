//! Error types for the balance service

use resilience::PersistenceError;
use thiserror::Error;

/// Balance service errors
///
/// Public manager reads never surface these; they come out of configuration
/// loading, snapshot persistence and the store plumbing.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decode failure
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Breaker snapshot persistence failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The state actor has stopped and no longer accepts commands
    #[error("Balance store is closed")]
    StoreClosed,

    /// An upstream balance source failed
    #[error("Source {source_name} failed: {error}")]
    Source {
        source_name: &'static str,
        error: anyhow::Error,
    },

    /// REST call rejected by the open circuit breaker
    #[error("Circuit breaker open: {0}")]
    BreakerOpen(String),

    /// REST call rejected by the local rate limiter
    #[error("REST rate limit exceeded")]
    RateLimited,
}

impl BalanceError {
    pub fn config(msg: impl Into<String>) -> Self {
        BalanceError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BalanceError>;
