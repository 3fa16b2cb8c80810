//! Single-owner state actor for cache and history
//!
//! [`BalanceStore`] owns the [`BalanceCache`] and [`BalanceHistory`] and is
//! the only code that mutates them. Everything else talks to it through a
//! cloneable [`StoreHandle`]: each request is an mpsc command carrying a
//! oneshot reply channel, so writes for any asset are applied strictly in the
//! order the manager submitted them. The actor also runs the periodic cache
//! sweep and history retention pass.

use crate::cache::{BalanceCache, CacheConfig, CacheEntry, CacheStats};
use crate::error::{BalanceError, Result};
use crate::history::{BalanceHistory, BalanceTrend, HistoryConfig, HistoryEntry, HistoryStats};
use crate::types::BalanceUpdate;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, trace};

const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Result of a write-through
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub entry: CacheEntry,
    pub history: HistoryEntry,
    /// Cached balance this write replaced, if any
    pub previous: Option<Decimal>,
}

/// Commands accepted by the store actor
#[derive(Debug)]
pub enum StoreCommand {
    Write {
        update: BalanceUpdate,
        reply: oneshot::Sender<WriteOutcome>,
    },
    Get {
        asset: String,
        reply: oneshot::Sender<Option<CacheEntry>>,
    },
    GetAll {
        reply: oneshot::Sender<HashMap<String, CacheEntry>>,
    },
    Invalidate {
        asset: String,
        reply: oneshot::Sender<bool>,
    },
    History {
        asset: String,
        limit: Option<usize>,
        since: Option<DateTime<Utc>>,
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    LatestHistory {
        asset: String,
        reply: oneshot::Sender<Option<HistoryEntry>>,
    },
    LatestHistoryAll {
        reply: oneshot::Sender<HashMap<String, HistoryEntry>>,
    },
    Changes {
        asset: String,
        since: Option<DateTime<Utc>>,
        threshold: Option<Decimal>,
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    Trend {
        asset: String,
        hours_back: u32,
        use_cache: bool,
        reply: oneshot::Sender<Option<BalanceTrend>>,
    },
    Stats {
        reply: oneshot::Sender<(CacheStats, HistoryStats)>,
    },
    SaveHistory {
        path: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
    LoadHistory {
        path: PathBuf,
        reply: oneshot::Sender<Result<usize>>,
    },
    Shutdown,
}

/// Owner of all mutable balance state
pub struct BalanceStore {
    cache: BalanceCache,
    history: BalanceHistory,
    commands: mpsc::Receiver<StoreCommand>,
    sweep_interval: Duration,
    retention_interval: Duration,
}

impl BalanceStore {
    /// Spawn the actor, returning its handle and task
    pub fn spawn(cache_config: &CacheConfig, history_config: HistoryConfig) -> (StoreHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let mut cache = BalanceCache::new(cache_config);
        cache.set_observer(|event| trace!(?event, "Cache event"));

        let store = Self {
            cache,
            sweep_interval: cache_config.cleanup_interval(),
            retention_interval: history_config.cleanup_interval(),
            history: BalanceHistory::new(history_config),
            commands: rx,
        };
        let task = tokio::spawn(store.run());
        (StoreHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        let mut sweep = interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        let mut retention = interval_at(
            Instant::now() + self.retention_interval,
            self.retention_interval,
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(StoreCommand::Shutdown) | None => break,
                        Some(command) => self.handle(command),
                    }
                }
                _ = sweep.tick() => {
                    let removed = self.cache.sweep_expired();
                    trace!(removed, "Cache sweep tick");
                }
                _ = retention.tick() => {
                    self.history.cleanup_expired();
                }
            }
        }

        info!(
            cached_assets = self.cache.len(),
            history_assets = self.history.assets().len(),
            "Balance store stopped"
        );
    }

    fn write(&mut self, update: BalanceUpdate) -> WriteOutcome {
        let previous = self.cache.peek(&update.asset).map(|entry| entry.balance);
        let entry = self
            .cache
            .put(&update.asset, update.balance, update.hold, update.source, None);
        let history = self.history.add_entry(
            &update.asset,
            update.balance,
            update.hold,
            update.source,
            Some(update.reason),
            Some(update.timestamp),
        );
        debug!(
            asset = %update.asset,
            balance = %update.balance,
            source = %update.source,
            "Balance written through"
        );
        WriteOutcome {
            entry,
            history,
            previous,
        }
    }

    // A dropped reply receiver only means the caller went away
    fn handle(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::Write { update, reply } => {
                let _ = reply.send(self.write(update));
            }
            StoreCommand::Get { asset, reply } => {
                let _ = reply.send(self.cache.get(&asset));
            }
            StoreCommand::GetAll { reply } => {
                let _ = reply.send(self.cache.get_all());
            }
            StoreCommand::Invalidate { asset, reply } => {
                let _ = reply.send(self.cache.invalidate(&asset));
            }
            StoreCommand::History {
                asset,
                limit,
                since,
                reply,
            } => {
                let _ = reply.send(self.history.get_asset_history(&asset, limit, since));
            }
            StoreCommand::LatestHistory { asset, reply } => {
                let _ = reply.send(self.history.get_current_balance(&asset));
            }
            StoreCommand::LatestHistoryAll { reply } => {
                let _ = reply.send(self.history.current_balances());
            }
            StoreCommand::Changes {
                asset,
                since,
                threshold,
                reply,
            } => {
                let _ = reply.send(self.history.get_balance_changes(&asset, since, threshold));
            }
            StoreCommand::Trend {
                asset,
                hours_back,
                use_cache,
                reply,
            } => {
                let _ = reply.send(self.history.analyze_balance_trend(&asset, hours_back, use_cache));
            }
            StoreCommand::Stats { reply } => {
                let _ = reply.send((self.cache.stats(), self.history.stats()));
            }
            StoreCommand::SaveHistory { path, reply } => {
                let _ = reply.send(self.history.save_snapshot(&path));
            }
            StoreCommand::LoadHistory { path, reply } => {
                let _ = reply.send(self.history.load_snapshot(&path));
            }
            StoreCommand::Shutdown => {}
        }
    }
}

/// Cloneable async front end of the store actor
#[derive(Debug, Clone)]
pub struct StoreHandle {
    commands: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| BalanceError::StoreClosed)?;
        response.await.map_err(|_| BalanceError::StoreClosed)
    }

    pub async fn write(&self, update: BalanceUpdate) -> Result<WriteOutcome> {
        self.request(|reply| StoreCommand::Write { update, reply }).await
    }

    pub async fn get(&self, asset: &str) -> Result<Option<CacheEntry>> {
        let asset = asset.to_string();
        self.request(|reply| StoreCommand::Get { asset, reply }).await
    }

    pub async fn get_all(&self) -> Result<HashMap<String, CacheEntry>> {
        self.request(|reply| StoreCommand::GetAll { reply }).await
    }

    pub async fn invalidate(&self, asset: &str) -> Result<bool> {
        let asset = asset.to_string();
        self.request(|reply| StoreCommand::Invalidate { asset, reply }).await
    }

    pub async fn history(
        &self,
        asset: &str,
        limit: Option<usize>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryEntry>> {
        let asset = asset.to_string();
        self.request(|reply| StoreCommand::History {
            asset,
            limit,
            since,
            reply,
        })
        .await
    }

    pub async fn latest_history(&self, asset: &str) -> Result<Option<HistoryEntry>> {
        let asset = asset.to_string();
        self.request(|reply| StoreCommand::LatestHistory { asset, reply }).await
    }

    pub async fn latest_history_all(&self) -> Result<HashMap<String, HistoryEntry>> {
        self.request(|reply| StoreCommand::LatestHistoryAll { reply }).await
    }

    pub async fn changes(
        &self,
        asset: &str,
        since: Option<DateTime<Utc>>,
        threshold: Option<Decimal>,
    ) -> Result<Vec<HistoryEntry>> {
        let asset = asset.to_string();
        self.request(|reply| StoreCommand::Changes {
            asset,
            since,
            threshold,
            reply,
        })
        .await
    }

    pub async fn trend(&self, asset: &str, hours_back: u32, use_cache: bool) -> Result<Option<BalanceTrend>> {
        let asset = asset.to_string();
        self.request(|reply| StoreCommand::Trend {
            asset,
            hours_back,
            use_cache,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> Result<(CacheStats, HistoryStats)> {
        self.request(|reply| StoreCommand::Stats { reply }).await
    }

    pub async fn save_history(&self, path: PathBuf) -> Result<()> {
        self.request(|reply| StoreCommand::SaveHistory { path, reply }).await?
    }

    pub async fn load_history(&self, path: PathBuf) -> Result<usize> {
        self.request(|reply| StoreCommand::LoadHistory { path, reply }).await?
    }

    /// Ask the actor to stop after draining earlier commands
    pub async fn shutdown(&self) {
        let _ = self.commands.send(StoreCommand::Shutdown).await;
    }
}
