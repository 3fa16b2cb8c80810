//! Shared balance domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a balance value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    /// Push-feed (WebSocket) update or snapshot
    Stream,
    /// Polled REST fallback
    Rest,
    /// Served from the in-memory cache
    Cache,
    /// Written by an operator or test harness
    Manual,
}

impl BalanceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceSource::Stream => "stream",
            BalanceSource::Rest => "rest",
            BalanceSource::Cache => "cache",
            BalanceSource::Manual => "manual",
        }
    }
}

impl fmt::Display for BalanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a balance changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Trade,
    Deposit,
    Withdrawal,
    Adjustment,
    StreamUpdate,
    RestUpdate,
    #[default]
    Unspecified,
}

impl ChangeReason {
    /// Default reason attached to writes from a given source
    pub fn for_source(source: BalanceSource) -> Self {
        match source {
            BalanceSource::Stream => ChangeReason::StreamUpdate,
            BalanceSource::Rest => ChangeReason::RestUpdate,
            BalanceSource::Manual => ChangeReason::Adjustment,
            BalanceSource::Cache => ChangeReason::Unspecified,
        }
    }
}

/// Balance as returned to consumers, with provenance
///
/// `free` is always `balance - hold`; construct through [`BalanceSnapshot::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub asset: String,
    pub balance: Decimal,
    pub hold: Decimal,
    pub free: Decimal,
    pub source: BalanceSource,
    pub timestamp: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn new(
        asset: impl Into<String>,
        balance: Decimal,
        hold: Decimal,
        source: BalanceSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            asset: asset.into(),
            balance,
            hold,
            free: balance - hold,
            source,
            timestamp,
        }
    }
}

/// A balance about to be written through cache and history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub asset: String,
    pub balance: Decimal,
    pub hold: Decimal,
    pub source: BalanceSource,
    pub reason: ChangeReason,
    pub timestamp: DateTime<Utc>,
}

impl BalanceUpdate {
    pub fn new(asset: impl Into<String>, balance: Decimal, hold: Decimal, source: BalanceSource) -> Self {
        Self {
            asset: asset.into(),
            balance,
            hold,
            source,
            reason: ChangeReason::for_source(source),
            timestamp: Utc::now(),
        }
    }
}
