//! Interfaces to the external balance sources
//!
//! The manager only talks to the push feed and the REST endpoint through
//! these traits. Transport, signing and authentication live behind them and
//! are wired up by whoever constructs the manager.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Balance reported by the push feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBalance {
    pub asset: String,
    pub balance: Decimal,
    pub hold: Decimal,
    /// Exchange-reported delta, informational only
    pub balance_change: Option<Decimal>,
}

impl StreamBalance {
    pub fn new(asset: impl Into<String>, balance: Decimal, hold: Decimal) -> Self {
        Self {
            asset: asset.into(),
            balance,
            hold,
            balance_change: None,
        }
    }
}

/// Unsolicited push-feed notifications
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Balance(Vec<StreamBalance>),
    Connected,
    Disconnected,
    Authenticated,
}

/// Push-feed client capabilities the manager relies on
#[async_trait]
pub trait BalanceStream: Send + Sync {
    fn is_connected(&self) -> bool;

    fn is_authenticated(&self) -> bool;

    /// Request the balance channel; false if the feed refused
    async fn subscribe_balance(&self) -> bool;

    /// Receiver for every event the feed emits from now on
    fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent>;

    /// Feed's in-memory balance for one asset
    async fn get_balance(&self, asset: &str) -> Option<StreamBalance>;

    /// Feed's in-memory balances, `None` if it has no snapshot yet
    async fn get_all_balances(&self) -> Option<HashMap<String, StreamBalance>>;
}

/// Polled REST balance endpoint
///
/// REST reports totals only; holds are taken to be zero.
#[async_trait]
pub trait BalanceRestClient: Send + Sync {
    async fn fetch_balances(&self) -> anyhow::Result<HashMap<String, Decimal>>;
}
