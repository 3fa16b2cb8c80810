//! # Balance Service - Resilient Account Balance State
//!
//! ## Purpose
//!
//! Keeps an always-available, validated view of exchange account balances.
//! A push feed is the primary source; a rate-limited REST endpoint guarded by
//! a circuit breaker is the fallback. Every fresh value is written through a
//! bounded cache and a per-asset history, checked by a rule-based validator,
//! and announced as a typed event.
//!
//! ## Integration Points
//!
//! - **Sources**: implement [`BalanceStream`] for the push feed and
//!   [`BalanceRestClient`] for the REST endpoint, then hand both to
//!   [`BalanceManager::new`]
//! - **Reads**: [`BalanceManager::get_balance`] and
//!   [`BalanceManager::get_all_balances`] never fail; degraded sources yield a
//!   stale value or nothing, with provenance on every [`BalanceSnapshot`]
//! - **Events**: [`BalanceManager::register_callback`] per [`EventKind`], or
//!   [`BalanceManager::subscribe`] for a broadcast receiver
//! - **Diagnostics**: [`BalanceManager::get_status`],
//!   [`BalanceManager::validate_all_balances`], history and trend queries
//!
//! ## Architecture
//!
//! ```text
//! push feed ──events──┐
//!                     ├──► BalanceManager ──► BalanceStore actor (cache + history)
//! REST ◄─ breaker ◄───┘         │
//!                               ├──► BalanceValidator
//!                               └──► EventBus ──► listeners / subscribers
//! ```
//!
//! ## Examples
//!
//! ```rust,no_run
//! use balance_service::{BalanceManager, BalanceManagerConfig, BalanceRestClient, BalanceStream, EventKind};
//! use std::sync::Arc;
//!
//! # async fn run(stream: Arc<dyn BalanceStream>, rest: Arc<dyn BalanceRestClient>) -> anyhow::Result<()> {
//! let manager = BalanceManager::new(stream, rest, BalanceManagerConfig::from_env())?;
//! manager.register_callback(EventKind::BalanceChange, |event| println!("{:?}", event));
//! manager.initialize().await;
//!
//! if let Some(btc) = manager.get_balance("BTC", false).await {
//!     println!("BTC free {} via {}", btc.free, btc.source);
//! }
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod manager;
pub mod rate_limit;
pub mod store;
pub mod types;
pub mod validator;

pub use cache::{BalanceCache, CacheConfig, CacheEntry, CacheEvent, CacheStats};
pub use collaborators::{BalanceRestClient, BalanceStream, StreamBalance, StreamEvent};
pub use config::{BalanceManagerConfig, BreakerSettings};
pub use error::{BalanceError, Result};
pub use events::{BalanceEvent, EventBus, EventKind};
pub use history::{BalanceHistory, BalanceTrend, HistoryConfig, HistoryEntry, HistoryStats, TrendDirection};
pub use manager::{BalanceManager, CounterSnapshot, ManagerState, ManagerStatus};
pub use rate_limit::RestRateLimiter;
pub use store::{BalanceStore, StoreHandle, WriteOutcome};
pub use types::{BalanceSnapshot, BalanceSource, BalanceUpdate, ChangeReason};
pub use validator::{
    BalanceValidator, Severity, ValidationIssue, ValidationResult, ValidationRule, ValidatorConfig,
};
