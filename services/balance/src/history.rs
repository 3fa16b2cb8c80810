//! Per-asset balance time series with change detection and trend analysis
//!
//! Each asset keeps a bounded sequence ordered by arrival (oldest first).
//! Entries are immutable once appended. Retention is enforced two ways: a hard
//! per-asset cap applied on every append, and a time window applied by
//! [`BalanceHistory::cleanup_expired`].

use crate::error::Result;
use crate::types::{BalanceSource, ChangeReason};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Slopes smaller than this are reported as stable
const SLOPE_EPSILON: f64 = 1e-6;

/// Coefficient of variation above which a series is volatile
const VOLATILITY_THRESHOLD: f64 = 0.5;

const SNAPSHOT_VERSION: &str = "1.0";

/// History configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries_per_asset: usize,
    pub retention_hours: u32,
    pub cleanup_interval_secs: u64,
    pub trend_cache_ttl_secs: u64,
    /// Fewer points than this yields no trend
    pub min_trend_points: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries_per_asset: 1000,
            retention_hours: 24,
            cleanup_interval_secs: 3600,
            trend_cache_ttl_secs: 300,
            min_trend_points: 3,
        }
    }
}

impl HistoryConfig {
    pub fn retention(&self) -> ChronoDuration {
        ChronoDuration::hours(i64::from(self.retention_hours))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn trend_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.trend_cache_ttl_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_entries_per_asset == 0 {
            return Err("History max_entries_per_asset must be greater than 0".to_string());
        }
        if self.retention_hours == 0 {
            return Err("History retention must be at least one hour".to_string());
        }
        if self.cleanup_interval_secs == 0 {
            return Err("History cleanup interval must be greater than 0".to_string());
        }
        if self.min_trend_points < 2 {
            return Err("Trend analysis needs at least 2 points".to_string());
        }
        Ok(())
    }
}

/// One recorded balance observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub asset: String,
    pub balance: Decimal,
    pub hold: Decimal,
    pub free: Decimal,
    pub source: BalanceSource,
    pub change_reason: ChangeReason,
    pub timestamp: DateTime<Utc>,
    pub previous_balance: Option<Decimal>,
    /// `balance - previous_balance` when a previous entry exists
    pub balance_change: Option<Decimal>,
}

impl HistoryEntry {
    fn new(
        asset: &str,
        balance: Decimal,
        hold: Decimal,
        source: BalanceSource,
        change_reason: ChangeReason,
        timestamp: DateTime<Utc>,
        previous_balance: Option<Decimal>,
    ) -> Self {
        Self {
            asset: asset.to_string(),
            balance,
            hold,
            free: balance - hold,
            source,
            change_reason,
            timestamp,
            previous_balance,
            balance_change: previous_balance.map(|previous| balance - previous),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Volatile => "volatile",
        }
    }
}

/// Result of a trend analysis over a lookback window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceTrend {
    pub asset: String,
    pub direction: TrendDirection,
    /// R² of the least-squares fit, in [0, 1]
    pub strength: f64,
    /// Coefficient of variation, clamped to [0, 1]
    pub volatility: f64,
    pub slope: f64,
    pub start_balance: Decimal,
    pub end_balance: Decimal,
    pub change_amount: Decimal,
    pub change_percentage: f64,
    pub data_points: usize,
    pub period_hours: u32,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_entries: usize,
    pub assets_tracked: usize,
    pub entries_added: u64,
    pub entries_purged: u64,
    pub trend_cache_hits: u64,
    pub trend_cache_misses: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotMetadata {
    version: String,
    timestamp: DateTime<Utc>,
    retention_hours: u32,
    max_entries_per_asset: usize,
}

/// On-disk history document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistorySnapshot {
    metadata: SnapshotMetadata,
    statistics: HistoryStats,
    current_balances: BTreeMap<String, HistoryEntry>,
    history: BTreeMap<String, Vec<HistoryEntry>>,
}

/// Bounded balance history for every tracked asset
#[derive(Debug)]
pub struct BalanceHistory {
    config: HistoryConfig,
    history: HashMap<String, VecDeque<HistoryEntry>>,
    trend_cache: HashMap<(String, u32), (BalanceTrend, Instant)>,
    entries_added: u64,
    entries_purged: u64,
    trend_cache_hits: u64,
    trend_cache_misses: u64,
}

impl BalanceHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
            trend_cache: HashMap::new(),
            entries_added: 0,
            entries_purged: 0,
            trend_cache_hits: 0,
            trend_cache_misses: 0,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    fn invalidate_trends(&mut self, asset: &str) {
        self.trend_cache.retain(|(cached, _), _| cached != asset);
    }

    /// Append an observation for `asset`
    ///
    /// Entries are kept in arrival order; the oldest is dropped once the
    /// per-asset cap is exceeded.
    pub fn add_entry(
        &mut self,
        asset: &str,
        balance: Decimal,
        hold: Decimal,
        source: BalanceSource,
        change_reason: Option<ChangeReason>,
        timestamp: Option<DateTime<Utc>>,
    ) -> HistoryEntry {
        let series = self.history.entry(asset.to_string()).or_default();
        let previous = series.back().map(|entry| entry.balance);
        let entry = HistoryEntry::new(
            asset,
            balance,
            hold,
            source,
            change_reason.unwrap_or_else(|| ChangeReason::for_source(source)),
            timestamp.unwrap_or_else(Utc::now),
            previous,
        );

        series.push_back(entry.clone());
        let mut dropped = 0u64;
        while series.len() > self.config.max_entries_per_asset {
            series.pop_front();
            dropped += 1;
        }

        self.entries_added += 1;
        self.entries_purged += dropped;
        self.invalidate_trends(asset);
        entry
    }

    /// Entries for `asset`, newest first
    pub fn get_asset_history(
        &self,
        asset: &str,
        limit: Option<usize>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<HistoryEntry> {
        let Some(series) = self.history.get(asset) else {
            return Vec::new();
        };
        series
            .iter()
            .rev()
            .filter(|entry| since.map_or(true, |since| entry.timestamp >= since))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn get_current_balance(&self, asset: &str) -> Option<HistoryEntry> {
        self.history.get(asset)?.back().cloned()
    }

    /// Latest entry of every asset
    pub fn current_balances(&self) -> HashMap<String, HistoryEntry> {
        self.history
            .iter()
            .filter_map(|(asset, series)| series.back().map(|entry| (asset.clone(), entry.clone())))
            .collect()
    }

    /// Entry whose timestamp is closest to `at`
    pub fn get_balance_at_timestamp(&self, asset: &str, at: DateTime<Utc>) -> Option<HistoryEntry> {
        self.history
            .get(asset)?
            .iter()
            .min_by_key(|entry| (entry.timestamp - at).num_milliseconds().abs())
            .cloned()
    }

    /// Entries that changed the balance by at least `threshold`, newest first
    ///
    /// Without a threshold every non-zero change is returned.
    pub fn get_balance_changes(
        &self,
        asset: &str,
        since: Option<DateTime<Utc>>,
        threshold: Option<Decimal>,
    ) -> Vec<HistoryEntry> {
        self.get_asset_history(asset, None, since)
            .into_iter()
            .filter(|entry| match (entry.balance_change, threshold) {
                (Some(change), Some(threshold)) => change.abs() >= threshold,
                (Some(change), None) => !change.is_zero(),
                (None, _) => false,
            })
            .collect()
    }

    /// Trend over the last `hours_back` hours, `None` with too few points
    pub fn analyze_balance_trend(
        &mut self,
        asset: &str,
        hours_back: u32,
        use_cache: bool,
    ) -> Option<BalanceTrend> {
        let key = (asset.to_string(), hours_back);
        if use_cache {
            if let Some((trend, computed_at)) = self.trend_cache.get(&key) {
                if computed_at.elapsed() < self.config.trend_cache_ttl() {
                    self.trend_cache_hits += 1;
                    return Some(trend.clone());
                }
            }
        }
        self.trend_cache_misses += 1;

        let since = Utc::now() - ChronoDuration::hours(i64::from(hours_back));
        let mut points = self.get_asset_history(asset, None, Some(since));
        points.reverse();
        if points.len() < self.config.min_trend_points {
            debug!(asset = %asset, points = points.len(), "Not enough history for trend");
            return None;
        }

        let trend = compute_trend(asset, &points, hours_back)?;
        self.trend_cache.insert(key, (trend.clone(), Instant::now()));
        Some(trend)
    }

    /// Drop entries outside the retention window, returning how many went
    pub fn cleanup_expired(&mut self) -> usize {
        let cutoff = Utc::now() - self.config.retention();
        let mut purged = 0;
        let mut touched = Vec::new();

        for (asset, series) in self.history.iter_mut() {
            let before = series.len();
            series.retain(|entry| entry.timestamp >= cutoff);
            if series.len() != before {
                purged += before - series.len();
                touched.push(asset.clone());
            }
        }
        self.history.retain(|_, series| !series.is_empty());
        for asset in &touched {
            self.invalidate_trends(asset);
        }

        self.entries_purged += purged as u64;
        if purged > 0 {
            info!(purged, assets = touched.len(), "Purged expired balance history");
        }
        purged
    }

    pub fn assets(&self) -> Vec<String> {
        let mut assets: Vec<String> = self.history.keys().cloned().collect();
        assets.sort();
        assets
    }

    pub fn stats(&self) -> HistoryStats {
        let all = self.history.values().flat_map(|series| series.iter());
        let (mut oldest, mut newest) = (None::<DateTime<Utc>>, None::<DateTime<Utc>>);
        for entry in all {
            oldest = Some(oldest.map_or(entry.timestamp, |t| t.min(entry.timestamp)));
            newest = Some(newest.map_or(entry.timestamp, |t| t.max(entry.timestamp)));
        }

        HistoryStats {
            total_entries: self.history.values().map(VecDeque::len).sum(),
            assets_tracked: self.history.len(),
            entries_added: self.entries_added,
            entries_purged: self.entries_purged,
            trend_cache_hits: self.trend_cache_hits,
            trend_cache_misses: self.trend_cache_misses,
            oldest_entry: oldest,
            newest_entry: newest,
        }
    }

    /// Write the full history as JSON
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = HistorySnapshot {
            metadata: SnapshotMetadata {
                version: SNAPSHOT_VERSION.to_string(),
                timestamp: Utc::now(),
                retention_hours: self.config.retention_hours,
                max_entries_per_asset: self.config.max_entries_per_asset,
            },
            statistics: self.stats(),
            current_balances: self.current_balances().into_iter().collect(),
            history: self
                .history
                .iter()
                .map(|(asset, series)| (asset.clone(), series.iter().cloned().collect()))
                .collect(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(&snapshot)?)?;
        fs::rename(&tmp_path, path)?;

        info!(path = %path.display(), assets = snapshot.history.len(), "Saved balance history snapshot");
        Ok(())
    }

    /// Replace the in-memory history with a saved snapshot
    ///
    /// The current cap and retention window are re-applied, so loading an
    /// old snapshot can yield fewer entries than were written. Returns the
    /// number of entries kept.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<usize> {
        let data = fs::read_to_string(path)?;
        let snapshot: HistorySnapshot = serde_json::from_str(&data)?;
        let cutoff = Utc::now() - self.config.retention();

        self.history.clear();
        self.trend_cache.clear();
        let mut loaded = 0;
        for (asset, entries) in snapshot.history {
            let mut series: VecDeque<HistoryEntry> = entries
                .into_iter()
                .filter(|entry| entry.timestamp >= cutoff)
                .map(|mut entry| {
                    entry.free = entry.balance - entry.hold;
                    entry
                })
                .collect();
            while series.len() > self.config.max_entries_per_asset {
                series.pop_front();
            }
            if !series.is_empty() {
                loaded += series.len();
                self.history.insert(asset, series);
            }
        }

        info!(
            path = %path.display(),
            version = %snapshot.metadata.version,
            entries = loaded,
            "Loaded balance history snapshot"
        );
        Ok(loaded)
    }
}

/// Least-squares trend of balance against sequence index
fn compute_trend(asset: &str, points: &[HistoryEntry], period_hours: u32) -> Option<BalanceTrend> {
    let values: Vec<f64> = points
        .iter()
        .map(|entry| entry.balance.to_f64())
        .collect::<Option<_>>()?;
    let n = values.len() as f64;

    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx, mut ss_tot) = (0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        ss_tot += dy * dy;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;

    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| {
            let predicted = intercept + slope * i as f64;
            (y - predicted).powi(2)
        })
        .sum();
    let strength = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        0.0
    };

    // Sample (n-1) standard deviation, not population. A swing series such as
    // [100, 50, 150, 40, 160] has population CV 0.494 and sample CV 0.552; only
    // the sample form classifies it as volatile against the 0.5 cutoff.
    let std_dev = if values.len() > 1 {
        (ss_tot / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    let cv = if mean_y.abs() > f64::EPSILON {
        std_dev / mean_y.abs()
    } else {
        0.0
    };

    let direction = if cv > VOLATILITY_THRESHOLD {
        TrendDirection::Volatile
    } else if slope.abs() < SLOPE_EPSILON {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    let start_balance = points.first()?.balance;
    let end_balance = points.last()?.balance;
    let change_amount = end_balance - start_balance;
    let change_percentage = if start_balance.is_zero() {
        0.0
    } else {
        (change_amount / start_balance * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    };

    Some(BalanceTrend {
        asset: asset.to_string(),
        direction,
        strength,
        volatility: cv.clamp(0.0, 1.0),
        slope,
        start_balance,
        end_balance,
        change_amount,
        change_percentage,
        data_points: points.len(),
        period_hours,
        analyzed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn history() -> BalanceHistory {
        BalanceHistory::new(HistoryConfig::default())
    }

    fn fill(history: &mut BalanceHistory, asset: &str, values: &[Decimal], span_hours: i64) {
        let start = Utc::now() - ChronoDuration::hours(span_hours);
        let step = if values.len() > 1 {
            ChronoDuration::hours(span_hours) / (values.len() as i32 - 1)
        } else {
            ChronoDuration::zero()
        };
        for (i, value) in values.iter().enumerate() {
            history.add_entry(
                asset,
                *value,
                Decimal::ZERO,
                BalanceSource::Rest,
                None,
                Some(start + step * i as i32),
            );
        }
    }

    #[test]
    fn test_add_entry_tracks_change() {
        let mut history = history();
        let first = history.add_entry("BTC", dec!(1.0), dec!(0.1), BalanceSource::Stream, None, None);
        assert_eq!(first.previous_balance, None);
        assert_eq!(first.balance_change, None);
        assert_eq!(first.free, dec!(0.9));
        assert_eq!(first.change_reason, ChangeReason::StreamUpdate);

        let second = history.add_entry(
            "BTC",
            dec!(1.25),
            dec!(0),
            BalanceSource::Rest,
            Some(ChangeReason::Deposit),
            None,
        );
        assert_eq!(second.previous_balance, Some(dec!(1.0)));
        assert_eq!(second.balance_change, Some(dec!(0.25)));
        assert_eq!(history.get_current_balance("BTC").unwrap().balance, dec!(1.25));
    }

    #[test]
    fn test_history_newest_first_with_limit_and_since() {
        let mut history = history();
        fill(&mut history, "ETH", &[dec!(1), dec!(2), dec!(3), dec!(4)], 3);

        let all = history.get_asset_history("ETH", None, None);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].balance, dec!(4));

        let limited = history.get_asset_history("ETH", Some(2), None);
        assert_eq!(limited.iter().map(|e| e.balance).collect::<Vec<_>>(), vec![dec!(4), dec!(3)]);

        let recent = history.get_asset_history("ETH", None, Some(Utc::now() - ChronoDuration::minutes(90)));
        assert_eq!(recent.len(), 2);
        assert!(history.get_asset_history("DOGE", None, None).is_empty());
    }

    #[test]
    fn test_per_asset_cap() {
        let mut history = BalanceHistory::new(HistoryConfig {
            max_entries_per_asset: 3,
            ..Default::default()
        });
        for i in 0..10 {
            history.add_entry("SOL", Decimal::from(i), dec!(0), BalanceSource::Rest, None, None);
        }
        let entries = history.get_asset_history("SOL", None, None);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].balance, dec!(7));
        assert_eq!(history.stats().entries_purged, 7);
    }

    #[test]
    fn test_balance_at_timestamp_picks_closest() {
        let mut history = history();
        fill(&mut history, "BTC", &[dec!(10), dec!(20), dec!(30)], 2);

        let target = Utc::now() - ChronoDuration::minutes(50);
        let entry = history.get_balance_at_timestamp("BTC", target).unwrap();
        assert_eq!(entry.balance, dec!(20));
    }

    #[test]
    fn test_balance_changes_threshold() {
        let mut history = history();
        for value in [dec!(1.0), dec!(1.0), dec!(1.0005), dec!(2.0)] {
            history.add_entry("BTC", value, dec!(0), BalanceSource::Stream, None, None);
        }

        assert_eq!(history.get_balance_changes("BTC", None, None).len(), 2);
        let large = history.get_balance_changes("BTC", None, Some(dec!(0.5)));
        assert_eq!(large.len(), 1);
        assert_eq!(large[0].balance, dec!(2.0));
    }

    #[test]
    fn test_increasing_trend() {
        let mut history = history();
        fill(&mut history, "BTC", &[dec!(100), dec!(105), dec!(110), dec!(115), dec!(120)], 4);

        let trend = history.analyze_balance_trend("BTC", 5, true).unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.strength - 1.0).abs() < 1e-9);
        assert!((trend.slope - 5.0).abs() < 1e-9);
        assert_eq!(trend.change_amount, dec!(20));
        assert!((trend.change_percentage - 20.0).abs() < 1e-9);
        assert_eq!(trend.data_points, 5);
    }

    #[test]
    fn test_oscillating_series_is_volatile() {
        let mut history = history();
        fill(&mut history, "ETH", &[dec!(100), dec!(50), dec!(150), dec!(40), dec!(160)], 4);

        let trend = history.analyze_balance_trend("ETH", 5, false).unwrap();
        assert_eq!(trend.direction, TrendDirection::Volatile);
        // sqrt(12200 / 4) / 100
        assert!((trend.volatility - 0.5523).abs() < 1e-3);
    }

    #[test]
    fn test_flat_series_is_stable() {
        let mut history = history();
        fill(&mut history, "USDT", &[dec!(50), dec!(50), dec!(50)], 2);

        let trend = history.analyze_balance_trend("USDT", 3, false).unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.strength, 0.0);
    }

    #[test]
    fn test_insufficient_data_has_no_trend() {
        let mut history = history();
        fill(&mut history, "BTC", &[dec!(1), dec!(2)], 1);
        assert!(history.analyze_balance_trend("BTC", 2, true).is_none());
        assert!(history.analyze_balance_trend("NONE", 2, true).is_none());
    }

    #[test]
    fn test_trend_cache_invalidated_by_new_entry() {
        let mut history = history();
        fill(&mut history, "BTC", &[dec!(1), dec!(2), dec!(3)], 2);

        history.analyze_balance_trend("BTC", 3, true).unwrap();
        history.analyze_balance_trend("BTC", 3, true).unwrap();
        assert_eq!(history.stats().trend_cache_hits, 1);

        history.add_entry("BTC", dec!(0.5), dec!(0), BalanceSource::Rest, None, None);
        let trend = history.analyze_balance_trend("BTC", 3, true).unwrap();
        assert_eq!(trend.data_points, 4);
        assert_eq!(history.stats().trend_cache_hits, 1);
        assert_eq!(history.stats().trend_cache_misses, 2);
    }

    #[test]
    fn test_cleanup_expired_respects_retention() {
        let mut history = BalanceHistory::new(HistoryConfig {
            retention_hours: 1,
            ..Default::default()
        });
        let old = Utc::now() - ChronoDuration::hours(3);
        history.add_entry("OLD", dec!(1), dec!(0), BalanceSource::Rest, None, Some(old));
        history.add_entry("MIX", dec!(1), dec!(0), BalanceSource::Rest, None, Some(old));
        history.add_entry("MIX", dec!(2), dec!(0), BalanceSource::Rest, None, None);

        assert_eq!(history.cleanup_expired(), 2);
        assert_eq!(history.assets(), vec!["MIX".to_string()]);
        assert_eq!(history.stats().total_entries, 1);
    }

    #[test]
    fn test_snapshot_round_trip_reapplies_limits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history").join("balances.json");

        let mut history = history();
        fill(&mut history, "BTC", &[dec!(1), dec!(2), dec!(3), dec!(4)], 3);
        history.add_entry("ETH", dec!(5), dec!(1), BalanceSource::Stream, None, None);
        history.save_snapshot(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        for key in ["\"metadata\"", "\"retentionHours\"", "\"currentBalances\"", "\"history\"", "\"statistics\""] {
            assert!(contents.contains(key), "missing {key}");
        }

        let mut restored = BalanceHistory::new(HistoryConfig {
            max_entries_per_asset: 2,
            ..Default::default()
        });
        assert_eq!(restored.load_snapshot(&path).unwrap(), 3);
        assert_eq!(restored.get_current_balance("BTC").unwrap().balance, dec!(4));
        assert_eq!(restored.get_current_balance("ETH").unwrap().free, dec!(4));
    }
}
