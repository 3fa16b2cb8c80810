//! Balance manager: orchestrates sources, state and events
//!
//! Reads prefer the cache, then the push feed, then the REST endpoint behind
//! the circuit breaker. Every fresh value is written through the store actor
//! (cache + history), validated, and announced on the event bus. Public read
//! methods never return errors: a degraded source yields a stale value from
//! history or `None`, and the failure is reported through events.

use crate::cache::{CacheEntry, CacheStats};
use crate::collaborators::{BalanceRestClient, BalanceStream, StreamEvent};
use crate::config::BalanceManagerConfig;
use crate::error::{BalanceError, Result};
use crate::events::{BalanceEvent, EventBus, EventKind};
use crate::history::{BalanceTrend, HistoryEntry, HistoryStats};
use crate::rate_limit::RestRateLimiter;
use crate::store::{BalanceStore, StoreHandle};
use crate::types::{BalanceSnapshot, BalanceSource, BalanceUpdate};
use crate::validator::{BalanceValidator, ValidationResult};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use resilience::{BreakerError, CircuitBreaker, CircuitBreakerStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, warn};

const REST_BREAKER_NAME: &str = "balance-rest";

/// Manager lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Default)]
struct ManagerCounters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    stream_reads: AtomicU64,
    rest_reads: AtomicU64,
    stream_updates: AtomicU64,
    rest_failures: AtomicU64,
    fallbacks: AtomicU64,
    validation_failures: AtomicU64,
}

impl ManagerCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            stream_reads: self.stream_reads.load(Ordering::Relaxed),
            rest_reads: self.rest_reads.load(Ordering::Relaxed),
            stream_updates: self.stream_updates.load(Ordering::Relaxed),
            rest_failures: self.rest_failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub stream_reads: u64,
    pub rest_reads: u64,
    pub stream_updates: u64,
    pub rest_failures: u64,
    pub fallbacks: u64,
    pub validation_failures: u64,
}

/// Diagnostic snapshot returned by [`BalanceManager::get_status`]
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub state: ManagerState,
    pub stream_connected: bool,
    pub stream_authenticated: bool,
    /// False while the REST breaker is open
    pub rest_available: bool,
    pub circuit_breaker: CircuitBreakerStatus,
    pub cache: Option<CacheStats>,
    pub history: Option<HistoryStats>,
    pub counters: CounterSnapshot,
    pub last_stream_update_secs: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

struct ManagerInner {
    config: BalanceManagerConfig,
    stream: Arc<dyn BalanceStream>,
    rest: Arc<dyn BalanceRestClient>,
    breaker: CircuitBreaker,
    validator: BalanceValidator,
    rate_limiter: RestRateLimiter,
    store: StoreHandle,
    store_task: Mutex<Option<JoinHandle<()>>>,
    events: EventBus,
    state: RwLock<ManagerState>,
    counters: ManagerCounters,
    stream_connected: AtomicBool,
    last_stream_update: Mutex<Option<Instant>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Resilient balance view over a push feed and a REST fallback
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct BalanceManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for BalanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceManager")
            .field("state", &self.state())
            .field("breaker", &self.inner.breaker.state())
            .finish()
    }
}

impl BalanceManager {
    /// Build a manager around the two balance sources
    ///
    /// Spawns the store actor, so this must run inside a Tokio runtime.
    pub fn new(
        stream: Arc<dyn BalanceStream>,
        rest: Arc<dyn BalanceRestClient>,
        config: BalanceManagerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let breaker = CircuitBreaker::new(config.circuit_breaker.to_breaker_config(REST_BREAKER_NAME));
        let (store, store_task) = BalanceStore::spawn(&config.cache, config.history.clone());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                validator: BalanceValidator::new(config.validator.clone()),
                rate_limiter: RestRateLimiter::new(config.rest_requests_per_minute),
                config,
                stream,
                rest,
                breaker,
                store,
                store_task: Mutex::new(Some(store_task)),
                events: EventBus::new(),
                state: RwLock::new(ManagerState::Uninitialized),
                counters: ManagerCounters::default(),
                stream_connected: AtomicBool::new(false),
                last_stream_update: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                shutdown_tx,
            }),
        })
    }

    pub fn state(&self) -> ManagerState {
        *self.inner.state.read()
    }

    fn set_state(&self, next: ManagerState) {
        let mut state = self.inner.state.write();
        info!(from = ?*state, to = ?next, "Balance manager state change");
        *state = next;
    }

    pub fn config(&self) -> &BalanceManagerConfig {
        &self.inner.config
    }

    /// Wire the push feed, load balances once and start background tasks
    ///
    /// Returns false only when called outside the uninitialized state. A
    /// failed initial refresh is logged and the manager runs degraded until
    /// a source recovers.
    pub async fn initialize(&self) -> bool {
        {
            let mut state = self.inner.state.write();
            if *state != ManagerState::Uninitialized {
                warn!(state = ?*state, "Balance manager already initialized");
                return false;
            }
            *state = ManagerState::Initializing;
        }
        info!("Initializing balance manager");

        if let Some(path) = self.inner.config.history_snapshot_path.clone() {
            if path.exists() {
                match self.inner.store.load_history(path.clone()).await {
                    Ok(entries) => info!(path = %path.display(), entries, "Restored balance history"),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to restore balance history"),
                }
            }
        }

        // subscribe before the first refresh so no pushed update is missed
        let stream_events = self.inner.stream.subscribe_events();
        self.spawn_task(self.clone().run_stream_consumer(stream_events));

        if self.inner.stream.is_connected() {
            self.inner.stream_connected.store(true, Ordering::SeqCst);
            if self.inner.stream.is_authenticated() && !self.inner.stream.subscribe_balance().await {
                warn!("Push feed refused balance subscription");
            }
        }

        if !self.refresh_all_balances().await {
            warn!("Initial balance refresh failed, continuing degraded");
        }

        self.spawn_task(self.clone().run_health_monitor());
        self.spawn_task(self.clone().run_forced_refresh());
        self.spawn_task(self.clone().run_housekeeping());

        self.set_state(ManagerState::Running);
        true
    }

    /// Stop background tasks, persist state and stop the store
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.write();
            if matches!(*state, ManagerState::ShuttingDown | ManagerState::Stopped) {
                return;
            }
            *state = ManagerState::ShuttingDown;
        }
        info!("Shutting down balance manager");

        let _ = self.inner.shutdown_tx.send(true);
        let grace = self.inner.config.shutdown_grace();

        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
        let drained = timeout(grace, async {
            for task in tasks.iter_mut() {
                let _ = task.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(grace_ms = grace.as_millis() as u64, "Background tasks did not stop in time, aborting");
            for task in &tasks {
                task.abort();
            }
        }

        if let Some(path) = self.inner.config.history_snapshot_path.clone() {
            if let Err(e) = self.inner.store.save_history(path.clone()).await {
                warn!(path = %path.display(), error = %e, "Failed to save balance history");
            }
        }
        self.inner.breaker.shutdown();

        self.inner.store.shutdown().await;
        let store_task = self.inner.store_task.lock().take();
        if let Some(task) = store_task {
            if timeout(grace, task).await.is_err() {
                warn!("Balance store did not stop in time");
            }
        }

        self.set_state(ManagerState::Stopped);
    }

    fn spawn_task<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.inner.tasks.lock().push(handle);
    }

    fn stream_ready(&self) -> bool {
        self.inner.stream.is_connected() && self.inner.stream.is_authenticated()
    }

    fn emit(&self, event: BalanceEvent) {
        self.inner.events.emit(event);
    }

    fn emit_error(&self, operation: &str, error: &BalanceError) {
        error!(operation, error = %error, "Balance manager error");
        self.emit(BalanceEvent::Error {
            operation: operation.to_string(),
            message: error.to_string(),
        });
    }

    /// Register a listener for one event kind
    pub fn register_callback<F>(&self, kind: EventKind, listener: F) -> usize
    where
        F: Fn(&BalanceEvent) + Send + Sync + 'static,
    {
        self.inner.events.register(kind, listener)
    }

    /// Receiver for every event
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceEvent> {
        self.inner.events.subscribe()
    }

    fn report_validation(&self, asset: Option<&str>, result: &ValidationResult) {
        if result.is_valid {
            if !result.issues.is_empty() {
                debug!(asset = ?asset, issues = result.issues.len(), "Balance validation warnings");
            }
            return;
        }
        ManagerCounters::bump(&self.inner.counters.validation_failures);
        warn!(asset = ?asset, issues = result.issues.len(), "Balance validation failed");
        self.emit(BalanceEvent::ValidationFailed {
            asset: asset.map(str::to_string),
            issues: result.issues.clone(),
        });
    }

    /// Validate, store and announce one fresh balance
    async fn write_through(&self, update: BalanceUpdate) -> Option<BalanceSnapshot> {
        let validation = self.inner.validator.validate_single(
            &update.asset,
            update.balance,
            update.hold,
            update.source,
            Some(update.timestamp),
        );
        let asset = update.asset.clone();
        let source = update.source;

        let outcome = match self.inner.store.write(update).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.emit_error("write_through", &e);
                return None;
            }
        };
        self.report_validation(Some(&asset), &validation);

        let snapshot = outcome.entry.to_snapshot(source);
        self.emit(BalanceEvent::BalanceUpdate {
            snapshot: snapshot.clone(),
        });

        if let Some(previous) = outcome.previous {
            let change = snapshot.balance - previous;
            if !change.is_zero() && change.abs() >= self.inner.config.balance_change_threshold {
                info!(asset = %asset, %previous, current = %snapshot.balance, %change, "Balance changed");
                self.emit(BalanceEvent::BalanceChange {
                    asset,
                    previous,
                    current: snapshot.balance,
                    change,
                    source,
                });
            }
        }
        Some(snapshot)
    }

    async fn write_rest_balances(&self, balances: HashMap<String, Decimal>) -> HashMap<String, BalanceSnapshot> {
        let mut balances: Vec<(String, Decimal)> = balances.into_iter().collect();
        balances.sort_by(|a, b| a.0.cmp(&b.0));

        let mut snapshots = HashMap::with_capacity(balances.len());
        for (asset, amount) in balances {
            let update = BalanceUpdate::new(asset.clone(), amount, Decimal::ZERO, BalanceSource::Rest);
            if let Some(snapshot) = self.write_through(update).await {
                snapshots.insert(asset, snapshot);
            }
        }
        snapshots
    }

    /// One REST fetch through the rate limiter and circuit breaker
    async fn fetch_rest(&self) -> Result<HashMap<String, Decimal>> {
        if !self.inner.rate_limiter.check() {
            warn!(
                requests_per_minute = self.inner.rate_limiter.requests_per_minute(),
                "REST balance request throttled"
            );
            return Err(BalanceError::RateLimited);
        }

        let rest = &self.inner.rest;
        match self.inner.breaker.execute(|| rest.fetch_balances()).await {
            Ok(balances) => {
                ManagerCounters::bump(&self.inner.counters.rest_reads);
                debug!(assets = balances.len(), "Fetched balances over REST");
                Ok(balances)
            }
            Err(error) => {
                ManagerCounters::bump(&self.inner.counters.rest_failures);
                let error = match error {
                    BreakerError::Open { name, retry_after } => {
                        BalanceError::BreakerOpen(format!("{name}, retry after {retry_after:?}"))
                    }
                    BreakerError::Timeout { name, timeout } => BalanceError::Source {
                        source_name: "rest",
                        error: anyhow!("{name} timed out after {timeout:?}"),
                    },
                    BreakerError::Inner(error) => BalanceError::Source {
                        source_name: "rest",
                        error,
                    },
                };
                self.emit_error("rest_fetch", &error);
                Err(error)
            }
        }
    }

    /// Newest history entry for `asset`, served when fresh sources failed
    async fn fallback(&self, asset: &str, reason: &BalanceError) -> Option<BalanceSnapshot> {
        let entry = self.inner.store.latest_history(asset).await.ok().flatten()?;
        ManagerCounters::bump(&self.inner.counters.fallbacks);
        warn!(asset = %asset, as_of = %entry.timestamp, reason = %reason, "Serving stale balance");
        self.emit(BalanceEvent::FallbackActivated {
            asset: Some(asset.to_string()),
            reason: reason.to_string(),
        });
        Some(history_snapshot(entry))
    }

    async fn fallback_all(&self, reason: &BalanceError) -> HashMap<String, BalanceSnapshot> {
        let entries = self.inner.store.latest_history_all().await.unwrap_or_default();
        if entries.is_empty() {
            return HashMap::new();
        }
        ManagerCounters::bump(&self.inner.counters.fallbacks);
        warn!(assets = entries.len(), reason = %reason, "Serving stale balances");
        self.emit(BalanceEvent::FallbackActivated {
            asset: None,
            reason: reason.to_string(),
        });
        entries
            .into_iter()
            .map(|(asset, entry)| (asset, history_snapshot(entry)))
            .collect()
    }

    /// Balance for one asset, `None` if no source knows it
    pub async fn get_balance(&self, asset: &str, force_refresh: bool) -> Option<BalanceSnapshot> {
        ManagerCounters::bump(&self.inner.counters.requests);

        if !force_refresh {
            match self.inner.store.get(asset).await {
                Ok(Some(entry)) => {
                    ManagerCounters::bump(&self.inner.counters.cache_hits);
                    if self.inner.config.validate_on_read {
                        self.validate_cached(&entry);
                    }
                    return Some(entry.to_snapshot(BalanceSource::Cache));
                }
                Ok(None) => {}
                Err(e) => {
                    self.emit_error("get_balance", &e);
                    return None;
                }
            }
        }

        if self.stream_ready() {
            if let Some(balance) = self.inner.stream.get_balance(asset).await {
                ManagerCounters::bump(&self.inner.counters.stream_reads);
                let update = BalanceUpdate::new(asset, balance.balance, balance.hold, BalanceSource::Stream);
                return self.write_through(update).await;
            }
            debug!(asset = %asset, "Push feed has no balance, trying REST");
        }

        match self.fetch_rest().await {
            Ok(balances) => self.write_rest_balances(balances).await.remove(asset),
            Err(error) => self.fallback(asset, &error).await,
        }
    }

    /// Balances for every known asset
    pub async fn get_all_balances(&self, force_refresh: bool) -> HashMap<String, BalanceSnapshot> {
        ManagerCounters::bump(&self.inner.counters.requests);

        if !force_refresh {
            match self.inner.store.get_all().await {
                Ok(entries) if !entries.is_empty() => {
                    ManagerCounters::bump(&self.inner.counters.cache_hits);
                    let snapshots: HashMap<String, BalanceSnapshot> = entries
                        .into_iter()
                        .map(|(asset, entry)| (asset, entry.to_snapshot(BalanceSource::Cache)))
                        .collect();
                    if self.inner.config.validate_on_read {
                        let result = self.inner.validator.validate_multiple(&snapshots);
                        self.report_validation(None, &result);
                    }
                    return snapshots;
                }
                Ok(_) => {}
                Err(e) => {
                    self.emit_error("get_all_balances", &e);
                    return HashMap::new();
                }
            }
        }

        if let Some(snapshots) = self.refresh_from_stream().await {
            return snapshots;
        }

        match self.fetch_rest().await {
            Ok(balances) => self.write_rest_balances(balances).await,
            Err(error) => self.fallback_all(&error).await,
        }
    }

    fn validate_cached(&self, entry: &CacheEntry) {
        let result = self.inner.validator.validate_single(
            &entry.asset,
            entry.balance,
            entry.hold,
            BalanceSource::Cache,
            Some(entry.timestamp),
        );
        self.report_validation(Some(&entry.asset), &result);
    }

    /// Bypass the cache for one asset
    pub async fn refresh_balance(&self, asset: &str) -> Option<BalanceSnapshot> {
        self.get_balance(asset, true).await
    }

    /// Reload every balance from the feed, else REST
    pub async fn refresh_all_balances(&self) -> bool {
        if self.refresh_from_stream().await.is_some() {
            return true;
        }
        self.refresh_from_rest().await
    }

    async fn refresh_from_stream(&self) -> Option<HashMap<String, BalanceSnapshot>> {
        if !self.stream_ready() {
            return None;
        }
        let balances = self.inner.stream.get_all_balances().await?;
        if balances.is_empty() {
            return None;
        }
        ManagerCounters::bump(&self.inner.counters.stream_reads);

        let mut balances: Vec<_> = balances.into_values().collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        let mut snapshots = HashMap::with_capacity(balances.len());
        for balance in balances {
            let update = BalanceUpdate::new(balance.asset.clone(), balance.balance, balance.hold, BalanceSource::Stream);
            if let Some(snapshot) = self.write_through(update).await {
                snapshots.insert(balance.asset, snapshot);
            }
        }
        Some(snapshots)
    }

    async fn refresh_from_rest(&self) -> bool {
        match self.fetch_rest().await {
            Ok(balances) => {
                self.write_rest_balances(balances).await;
                true
            }
            Err(_) => false,
        }
    }

    /// Validate everything currently cached
    pub async fn validate_all_balances(&self) -> ValidationResult {
        let entries = self.inner.store.get_all().await.unwrap_or_default();
        let snapshots: HashMap<String, BalanceSnapshot> = entries
            .into_iter()
            .map(|(asset, entry)| {
                let source = entry.source;
                (asset, entry.to_snapshot(source))
            })
            .collect();
        let result = self.inner.validator.validate_multiple(&snapshots);
        self.report_validation(None, &result);
        result
    }

    /// Recorded history for `asset`, newest first
    pub async fn get_balance_history(
        &self,
        asset: &str,
        limit: Option<usize>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<HistoryEntry> {
        self.inner
            .store
            .history(asset, limit, since)
            .await
            .unwrap_or_default()
    }

    pub async fn get_balance_changes(
        &self,
        asset: &str,
        since: Option<DateTime<Utc>>,
        threshold: Option<Decimal>,
    ) -> Vec<HistoryEntry> {
        self.inner
            .store
            .changes(asset, since, threshold)
            .await
            .unwrap_or_default()
    }

    pub async fn analyze_balance_trend(&self, asset: &str, hours_back: u32) -> Option<BalanceTrend> {
        self.inner.store.trend(asset, hours_back, true).await.ok().flatten()
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.inner.breaker.get_status()
    }

    pub async fn get_status(&self) -> ManagerStatus {
        let (cache, history) = match self.inner.store.stats().await {
            Ok((cache, history)) => (Some(cache), Some(history)),
            Err(_) => (None, None),
        };
        let last_update = *self.inner.last_stream_update.lock();

        ManagerStatus {
            state: self.state(),
            stream_connected: self.inner.stream.is_connected(),
            stream_authenticated: self.inner.stream.is_authenticated(),
            rest_available: !self.inner.breaker.is_open(),
            circuit_breaker: self.inner.breaker.get_status(),
            cache,
            history,
            counters: self.inner.counters.snapshot(),
            last_stream_update_secs: last_update.map(|at| at.elapsed().as_secs_f64()),
            timestamp: Utc::now(),
        }
    }

    fn mark_stream_connected(&self, connected: bool) {
        let was_connected = self.inner.stream_connected.swap(connected, Ordering::SeqCst);
        if was_connected == connected {
            return;
        }
        if connected {
            info!("Push feed connected");
            self.emit(BalanceEvent::WebsocketConnected);
        } else {
            warn!("Push feed disconnected, REST fallback active");
            self.emit(BalanceEvent::WebsocketDisconnected);
        }
    }

    async fn handle_stream_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Balance(updates) => {
                *self.inner.last_stream_update.lock() = Some(Instant::now());
                for update in updates {
                    ManagerCounters::bump(&self.inner.counters.stream_updates);
                    let update = BalanceUpdate::new(update.asset, update.balance, update.hold, BalanceSource::Stream);
                    self.write_through(update).await;
                }
            }
            StreamEvent::Connected => self.mark_stream_connected(true),
            StreamEvent::Disconnected => self.mark_stream_connected(false),
            StreamEvent::Authenticated => {
                if !self.inner.stream.subscribe_balance().await {
                    warn!("Push feed refused balance subscription after authentication");
                }
            }
        }
    }

    async fn run_stream_consumer(self, mut stream_events: broadcast::Receiver<StreamEvent>) {
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = stream_events.recv() => match event {
                    Ok(event) => self.handle_stream_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Push feed events dropped, consumer lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Push feed event channel closed");
                        break;
                    }
                },
            }
        }
        debug!("Stream consumer stopped");
    }

    async fn run_health_monitor(self) {
        let period = self.inner.config.health_check_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.mark_stream_connected(self.inner.stream.is_connected());
                }
            }
        }
        debug!("Health monitor stopped");
    }

    async fn run_forced_refresh(self) {
        let period = self.inner.config.force_update_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let last_update = *self.inner.last_stream_update.lock();
                    let silent = last_update.map_or(true, |at| at.elapsed() >= period);
                    if silent {
                        debug!(period_secs = period.as_secs(), "No push-feed update, forcing REST refresh");
                        if !self.refresh_from_rest().await {
                            warn!("Forced REST refresh failed");
                        }
                    }
                }
            }
        }
        debug!("Forced refresh stopped");
    }

    async fn run_housekeeping(self) {
        let period = self.inner.config.housekeeping_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Ok((cache, history)) = self.inner.store.stats().await {
                        info!(
                            cache_size = cache.size,
                            cache_hit_rate = cache.hit_rate,
                            cache_evictions = cache.evictions,
                            history_assets = history.assets_tracked,
                            history_entries = history.total_entries,
                            breaker = ?self.inner.breaker.state(),
                            "Balance manager housekeeping"
                        );
                    }
                }
            }
        }
        debug!("Housekeeping stopped");
    }
}

fn history_snapshot(entry: HistoryEntry) -> BalanceSnapshot {
    BalanceSnapshot::new(entry.asset, entry.balance, entry.hold, entry.source, entry.timestamp)
}
