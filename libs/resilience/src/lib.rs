//! # Resilience - Circuit Breaking for Unreliable Upstreams
//!
//! ## Purpose
//!
//! Protects calls to flaky external dependencies (exchange REST endpoints,
//! RPC nodes) with a three-state circuit breaker. Callers get fail-fast
//! behavior while a dependency is down, bounded probing while it recovers,
//! and exponential backoff with jitter between failed recovery attempts.
//!
//! ## Integration Points
//!
//! - **Guarded calls**: [`CircuitBreaker::execute`] wraps any async operation
//!   returning `Result<T, E>` and enforces a per-call timeout
//! - **Self-managed calls**: [`CircuitBreaker::can_execute`] plus
//!   [`record_success`](CircuitBreaker::record_success) /
//!   [`record_failure`](CircuitBreaker::record_failure) for callers that run
//!   the request themselves
//! - **Monitoring**: [`CircuitBreakerStatus`] snapshot with rolling latency,
//!   windowed failure rate and per-state cumulative time
//! - **Crash recovery**: optional JSON snapshot restored when younger than
//!   one hour
//!
//! ## Examples
//!
//! ```rust,no_run
//! use resilience::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn fetch() -> Result<u32, std::io::Error> { Ok(1) }
//! # async fn run() {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default().with_name("rest"));
//!
//! match breaker.execute(|| fetch()).await {
//!     Ok(value) => println!("got {}", value),
//!     Err(BreakerError::Open { retry_after, .. }) => println!("short-circuited, retry in {:?}", retry_after),
//!     Err(BreakerError::Timeout { .. }) => println!("timed out"),
//!     Err(BreakerError::Inner(e)) => println!("upstream failed: {}", e),
//! }
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod persistence;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerStatus, CircuitState,
};
pub use error::{BreakerError, PersistenceError};
pub use persistence::{BreakerSnapshot, SNAPSHOT_MAX_AGE};
