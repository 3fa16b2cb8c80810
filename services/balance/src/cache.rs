//! Capacity-bounded balance cache with TTL expiry and LRU eviction
//!
//! Holds the latest known balance per asset. Expiry is checked lazily on
//! `get` and proactively by [`BalanceCache::sweep_expired`], which the store
//! actor runs on a fixed interval. Recency is tracked with a monotonically
//! increasing access tick, so the least-recently-used entry is always the
//! first key of the ordering map.

use crate::types::{BalanceSnapshot, BalanceSource};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of assets held
    pub max_size: usize,
    /// TTL applied when `put` is called without one
    pub default_ttl_secs: u64,
    /// Interval of the background expiry sweep
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("Cache max_size must be greater than 0".to_string());
        }
        if self.default_ttl_secs == 0 {
            return Err("Cache default TTL must be greater than 0".to_string());
        }
        if self.cleanup_interval_secs == 0 {
            return Err("Cache cleanup interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Cached balance for one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub asset: String,
    pub balance: Decimal,
    pub hold: Decimal,
    /// Creation time of this value
    pub timestamp: DateTime<Utc>,
    /// Source that produced the value
    pub source: BalanceSource,
    pub ttl: Duration,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
    inserted_at: Instant,
    recency: u64,
}

impl CacheEntry {
    /// Always `balance - hold`
    pub fn free(&self) -> Decimal {
        self.balance - self.hold
    }

    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }

    /// Consumer-facing view reporting `source`
    pub fn to_snapshot(&self, source: BalanceSource) -> BalanceSnapshot {
        BalanceSnapshot::new(
            self.asset.clone(),
            self.balance,
            self.hold,
            source,
            self.timestamp,
        )
    }
}

/// Observable cache mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Hit { asset: String },
    Miss { asset: String },
    Eviction { asset: String },
    Expiration { asset: String },
    Invalidation { asset: String },
    Update { asset: String, source: BalanceSource },
}

pub type CacheObserver = Box<dyn Fn(&CacheEvent) + Send + Sync>;

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub updates: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

/// LRU + TTL balance cache
pub struct BalanceCache {
    entries: HashMap<String, CacheEntry>,
    /// access tick -> asset, oldest first
    order: BTreeMap<u64, String>,
    tick: u64,
    max_size: usize,
    default_ttl: Duration,
    stats: CacheStats,
    observer: Option<CacheObserver>,
}

impl std::fmt::Debug for BalanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceCache")
            .field("size", &self.entries.len())
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl BalanceCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            max_size: config.max_size.max(1),
            default_ttl: config.default_ttl(),
            stats: CacheStats::default(),
            observer: None,
        }
    }

    /// Install a callback that receives every cache event
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    fn notify(&self, event: CacheEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, asset: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(asset) {
            self.order.remove(&entry.recency);
            entry.recency = tick;
            self.order.insert(tick, asset.to_string());
        }
    }

    fn remove_entry(&mut self, asset: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(asset)?;
        self.order.remove(&entry.recency);
        Some(entry)
    }

    /// Look up an asset, expiring it lazily
    ///
    /// A hit moves the entry to most-recently-used and bumps its access count.
    pub fn get(&mut self, asset: &str) -> Option<CacheEntry> {
        let expired = match self.entries.get(asset) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.misses += 1;
                self.notify(CacheEvent::Miss {
                    asset: asset.to_string(),
                });
                return None;
            }
        };

        if expired {
            self.remove_entry(asset);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            trace!(asset = %asset, "Cache entry expired on read");
            self.notify(CacheEvent::Expiration {
                asset: asset.to_string(),
            });
            self.notify(CacheEvent::Miss {
                asset: asset.to_string(),
            });
            return None;
        }

        self.touch(asset);
        self.stats.hits += 1;
        let entry = self.entries.get_mut(asset).map(|entry| {
            entry.access_count += 1;
            entry.last_access = Utc::now();
            entry.clone()
        });
        self.notify(CacheEvent::Hit {
            asset: asset.to_string(),
        });
        entry
    }

    /// Entry without recency, counter or expiry side effects
    pub fn peek(&self, asset: &str) -> Option<&CacheEntry> {
        self.entries.get(asset)
    }

    /// Insert or overwrite an asset and make it most-recently-used
    pub fn put(
        &mut self,
        asset: &str,
        balance: Decimal,
        hold: Decimal,
        source: BalanceSource,
        ttl: Option<Duration>,
    ) -> CacheEntry {
        let now = Utc::now();
        let tick = self.next_tick();
        let access_count = match self.remove_entry(asset) {
            Some(previous) => previous.access_count,
            None => 0,
        };

        let entry = CacheEntry {
            asset: asset.to_string(),
            balance,
            hold,
            timestamp: now,
            source,
            ttl: ttl.unwrap_or(self.default_ttl),
            access_count,
            last_access: now,
            inserted_at: Instant::now(),
            recency: tick,
        };
        self.entries.insert(asset.to_string(), entry.clone());
        self.order.insert(tick, asset.to_string());
        self.stats.updates += 1;
        self.notify(CacheEvent::Update {
            asset: asset.to_string(),
            source,
        });

        self.evict_to_capacity();
        entry
    }

    fn evict_to_capacity(&mut self) {
        while self.entries.len() > self.max_size {
            let Some((_, asset)) = self.order.pop_first() else {
                break;
            };
            if self.entries.remove(&asset).is_some() {
                self.stats.evictions += 1;
                debug!(asset = %asset, max_size = self.max_size, "Evicted least recently used balance");
                self.notify(CacheEvent::Eviction { asset });
            }
        }
    }

    /// Remove an asset, returning whether it was present
    pub fn invalidate(&mut self, asset: &str) -> bool {
        if self.remove_entry(asset).is_some() {
            self.stats.invalidations += 1;
            self.notify(CacheEvent::Invalidation {
                asset: asset.to_string(),
            });
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        let assets: Vec<String> = self.entries.keys().cloned().collect();
        self.entries.clear();
        self.order.clear();
        for asset in assets {
            self.stats.invalidations += 1;
            self.notify(CacheEvent::Invalidation { asset });
        }
    }

    /// All non-expired entries; recency is left untouched
    pub fn get_all(&self) -> HashMap<String, CacheEntry> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(asset, entry)| (asset.clone(), entry.clone()))
            .collect()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep_expired(&mut self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(asset, _)| asset.clone())
            .collect();

        for asset in &expired {
            self.remove_entry(asset);
            self.stats.expirations += 1;
            self.notify(CacheEvent::Expiration {
                asset: asset.clone(),
            });
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "Swept expired cache entries");
        }
        expired.len()
    }

    /// Change capacity, evicting LRU entries until the cache fits
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        self.evict_to_capacity();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.stats.hits + self.stats.misses;
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            hit_rate: if lookups > 0 {
                self.stats.hits as f64 / lookups as f64
            } else {
                0.0
            },
            ..self.stats.clone()
        }
    }
}
