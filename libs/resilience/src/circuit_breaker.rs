//! Circuit Breaker with Exponential Recovery Backoff
//!
//! Guards a fallible upstream (typically a REST endpoint) behind a three-state
//! machine. Failures are counted both consecutively and as a rate over a
//! rolling window; every reopen after a failed probe stretches the recovery
//! timeout exponentially, with jitter so that several breakers do not probe
//! in lockstep.
//!
//! ## Circuit Breaker States
//!
//! ```text
//! CLOSED ──threshold / failure rate──> OPEN ──recovery timeout──> HALF_OPEN
//!   ▲                                   ▲                            │
//!   │                                   └──────── any failure ───────┤
//!   └──────────────────── success_threshold successes ───────────────┘
//! ```
//!
//! - **CLOSED**: requests pass through
//! - **OPEN**: requests fail fast with [`BreakerError::Open`]
//! - **HALF_OPEN**: at most `max_half_open_requests` probes in flight
//!
//! State lives behind a single `parking_lot::Mutex` that is never held across
//! an await point, so the breaker can be shared freely between tasks.

use crate::error::{BreakerError, PersistenceError};
use crate::persistence::{BreakerSnapshot, SNAPSHOT_MAX_AGE};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing - requests are rejected
    Open,
    /// Testing recovery - limited requests allowed
    HalfOpen,
}

impl CircuitState {
    pub fn is_closed(&self) -> bool {
        matches!(self, CircuitState::Closed)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, CircuitState::Open)
    }

    pub fn is_half_open(&self) -> bool {
        matches!(self, CircuitState::HalfOpen)
    }

    fn slot(self) -> usize {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Name used in logs, errors and snapshots
    pub name: String,
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,
    /// Base recovery timeout; also the floor of every backed-off timeout
    pub recovery_timeout: Duration,
    /// Upper bound for the backed-off recovery timeout
    pub max_backoff: Duration,
    /// Growth factor applied per failed recovery attempt
    pub backoff_multiplier: f64,
    /// Relative jitter width (0.1 = ±5% of the timeout)
    pub jitter_range: f64,
    /// Concurrent probes admitted while half-open
    pub max_half_open_requests: u32,
    /// Per-call timeout enforced by `execute`
    pub call_timeout: Duration,
    /// Window over which the failure rate is measured
    pub monitoring_window: Duration,
    /// Failure rate (0..=1) that opens the circuit once enough calls are seen
    pub failure_rate_threshold: f64,
    /// Number of recent latencies kept for the moving average
    pub latency_window: usize,
    /// Where to persist snapshots (None = no persistence)
    pub persistence_path: Option<PathBuf>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "circuit-breaker".to_string(),
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter_range: 0.1,
            max_half_open_requests: 3,
            call_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            failure_rate_threshold: 0.5,
            latency_window: 100,
            persistence_path: None,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the breaker name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable snapshot persistence at `path`
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_path = Some(path.into());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("Failure threshold must be greater than 0".to_string());
        }
        if self.success_threshold == 0 {
            return Err("Success threshold must be greater than 0".to_string());
        }
        if self.max_half_open_requests == 0 {
            return Err("Max half-open requests must be greater than 0".to_string());
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err("Backoff multiplier must be a finite value >= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_range) {
            return Err("Jitter range must be within [0, 1]".to_string());
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 1.0) {
            return Err("Failure rate threshold must be within (0, 1]".to_string());
        }
        if self.call_timeout.is_zero() {
            return Err("Call timeout must be greater than 0".to_string());
        }
        if self.latency_window == 0 {
            return Err("Latency window must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Recovery timeout for the given number of failed recovery attempts
    ///
    /// `min(max_backoff, base * multiplier^(attempts-1))` perturbed by
    /// `±timeout * jitter_range / 2`, never below the base timeout.
    pub fn recovery_timeout_for(&self, attempts: u32) -> Duration {
        let base = self.recovery_timeout.as_secs_f64();
        if attempts == 0 {
            return self.recovery_timeout;
        }

        let exponent = i32::try_from(attempts - 1).unwrap_or(i32::MAX);
        let timeout = (base * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff.as_secs_f64());

        let spread = timeout * self.jitter_range / 2.0;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };

        Duration::from_secs_f64((timeout + jitter).max(base))
    }
}

/// Cumulative metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Every call seen, including rejected ones
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Calls rejected without being attempted
    pub blocked_requests: u64,
    pub state_transitions: u64,
    /// Simple moving average over the latency window, in milliseconds
    pub average_response_time_ms: f64,
    /// Failure rate over the monitoring window
    pub failure_rate: f64,
    pub time_in_closed_secs: f64,
    pub time_in_open_secs: f64,
    pub time_in_half_open_secs: f64,
}

/// Point-in-time view of the breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub recovery_attempts: u32,
    pub half_open_in_flight: u32,
    pub last_state_change: DateTime<Utc>,
    /// Recovery timeout that applies to the current (or next) open period
    pub current_recovery_timeout_ms: u64,
    /// Time until the next probe is admitted, only while open
    pub retry_after_ms: Option<u64>,
    pub metrics: CircuitBreakerMetrics,
}

/// Internal state for the circuit breaker
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    recovery_attempts: u32,
    half_open_in_flight: u32,
    state_changed_at: Instant,
    last_state_change: DateTime<Utc>,
    current_recovery_timeout: Duration,

    // (timestamp, success) inside the monitoring window
    recent_outcomes: VecDeque<(Instant, bool)>,
    latencies: VecDeque<Duration>,

    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    blocked_requests: u64,
    state_transitions: u64,
    time_in_state: [Duration; 3],
}

impl BreakerInner {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            recovery_attempts: 0,
            half_open_in_flight: 0,
            state_changed_at: Instant::now(),
            last_state_change: Utc::now(),
            current_recovery_timeout: config.recovery_timeout,
            recent_outcomes: VecDeque::new(),
            latencies: VecDeque::with_capacity(config.latency_window),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            blocked_requests: 0,
            state_transitions: 0,
            time_in_state: [Duration::ZERO; 3],
        }
    }

    fn transition_to(&mut self, new_state: CircuitState, config: &CircuitBreakerConfig, reason: &str) -> bool {
        if self.state == new_state {
            return false;
        }

        let old_state = self.state;
        self.time_in_state[old_state.slot()] += self.state_changed_at.elapsed();
        self.state = new_state;
        self.state_changed_at = Instant::now();
        self.last_state_change = Utc::now();
        self.state_transitions += 1;

        match new_state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
                self.recovery_attempts = 0;
                self.half_open_in_flight = 0;
                self.recent_outcomes.clear();
            }
            CircuitState::Open => {
                self.success_count = 0;
                self.half_open_in_flight = 0;
                self.current_recovery_timeout = config.recovery_timeout_for(self.recovery_attempts);
            }
            CircuitState::HalfOpen => {
                self.success_count = 0;
                self.half_open_in_flight = 0;
            }
        }

        if new_state.is_open() {
            warn!(
                breaker = %config.name,
                from = ?old_state,
                to = ?new_state,
                reason,
                recovery_attempts = self.recovery_attempts,
                recovery_timeout_ms = self.current_recovery_timeout.as_millis() as u64,
                "Circuit breaker state transition"
            );
        } else {
            info!(
                breaker = %config.name,
                from = ?old_state,
                to = ?new_state,
                reason,
                "Circuit breaker state transition"
            );
        }
        true
    }

    fn record_outcome(&mut self, success: bool, latency: Option<Duration>, config: &CircuitBreakerConfig) {
        let now = Instant::now();
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        if let Some(latency) = latency {
            if self.latencies.len() == config.latency_window {
                self.latencies.pop_front();
            }
            self.latencies.push_back(latency);
        }

        self.recent_outcomes.push_back((now, success));
        self.prune_window(now, config.monitoring_window);
    }

    fn prune_window(&mut self, now: Instant, window: Duration) {
        while let Some((timestamp, _)) = self.recent_outcomes.front() {
            if now.duration_since(*timestamp) > window {
                self.recent_outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_failure_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.recent_outcomes.iter().filter(|(_, ok)| !ok).count();
        failures as f64 / self.recent_outcomes.len() as f64
    }

    fn average_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        let total: Duration = self.latencies.iter().sum();
        total.as_secs_f64() * 1000.0 / self.latencies.len() as f64
    }

    fn retry_after(&self) -> Duration {
        match self.state {
            CircuitState::Open => self
                .current_recovery_timeout
                .saturating_sub(self.state_changed_at.elapsed()),
            _ => Duration::ZERO,
        }
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let mut time_in_state = self.time_in_state;
        time_in_state[self.state.slot()] += self.state_changed_at.elapsed();

        CircuitBreakerMetrics {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            blocked_requests: self.blocked_requests,
            state_transitions: self.state_transitions,
            average_response_time_ms: self.average_latency_ms(),
            failure_rate: self.window_failure_rate(),
            time_in_closed_secs: time_in_state[0].as_secs_f64(),
            time_in_open_secs: time_in_state[1].as_secs_f64(),
            time_in_half_open_secs: time_in_state[2].as_secs_f64(),
        }
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            last_state_change: self.last_state_change,
            failure_count: self.failure_count,
            success_count: self.success_count,
            recovery_attempts: self.recovery_attempts,
            metrics: self.metrics(),
            timestamp: Utc::now(),
        }
    }

    fn restore(&mut self, snapshot: BreakerSnapshot, config: &CircuitBreakerConfig) {
        let elapsed = (Utc::now() - snapshot.last_state_change)
            .to_std()
            .unwrap_or(Duration::ZERO);

        self.state = snapshot.state;
        self.failure_count = snapshot.failure_count;
        self.success_count = snapshot.success_count;
        self.recovery_attempts = snapshot.recovery_attempts;
        self.half_open_in_flight = 0;
        self.last_state_change = snapshot.last_state_change;
        self.state_changed_at = Instant::now().checked_sub(elapsed).unwrap_or_else(Instant::now);
        self.current_recovery_timeout = config.recovery_timeout_for(self.recovery_attempts);

        let metrics = snapshot.metrics;
        self.total_requests = metrics.total_requests;
        self.successful_requests = metrics.successful_requests;
        self.failed_requests = metrics.failed_requests;
        self.blocked_requests = metrics.blocked_requests;
        self.state_transitions = metrics.state_transitions;
        self.time_in_state = [
            Duration::from_secs_f64(metrics.time_in_closed_secs.max(0.0)),
            Duration::from_secs_f64(metrics.time_in_open_secs.max(0.0)),
            Duration::from_secs_f64(metrics.time_in_half_open_secs.max(0.0)),
        ];
        // Elapsed time in the restored state is re-added from state_changed_at
        self.time_in_state[self.state.slot()] = self.time_in_state[self.state.slot()].saturating_sub(elapsed);
    }
}

/// Thread-safe circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// When persistence is configured and a snapshot younger than one hour
    /// exists, the breaker resumes from it; otherwise it starts CLOSED.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let mut inner = BreakerInner::new(&config);

        if let Some(path) = &config.persistence_path {
            match BreakerSnapshot::load_fresh(path, SNAPSHOT_MAX_AGE) {
                Ok(Some(snapshot)) => {
                    info!(
                        breaker = %config.name,
                        state = ?snapshot.state,
                        recovery_attempts = snapshot.recovery_attempts,
                        "Restored circuit breaker from snapshot"
                    );
                    inner.restore(snapshot, &config);
                }
                Ok(None) => {}
                Err(PersistenceError::Stale { age_secs }) => {
                    debug!(breaker = %config.name, age_secs, "Ignoring stale circuit breaker snapshot");
                }
                Err(e) => {
                    warn!(breaker = %config.name, error = %e, "Failed to load circuit breaker snapshot");
                }
            }
        }

        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state without triggering any transition
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Check whether a request may proceed
    ///
    /// An OPEN circuit whose recovery timeout has elapsed moves to HALF_OPEN
    /// here. While HALF_OPEN, a `true` answer admits the caller as one of the
    /// limited probes; the caller must report the outcome through
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn can_execute(&self) -> bool {
        !matches!(self.admit(), Admission::Rejected)
    }

    fn admit(&self) -> Admission {
        let (admission, transitioned) = {
            let mut inner = self.inner.lock();
            let state = inner.state;
            match state {
                CircuitState::Closed => (Admission::Closed, false),
                CircuitState::Open => {
                    if inner.state_changed_at.elapsed() >= inner.current_recovery_timeout {
                        inner.transition_to(CircuitState::HalfOpen, &self.config, "recovery timeout elapsed");
                        inner.half_open_in_flight = 1;
                        (Admission::HalfOpen(inner.state_transitions), true)
                    } else {
                        (Admission::Rejected, false)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_in_flight < self.config.max_half_open_requests {
                        inner.half_open_in_flight += 1;
                        (Admission::HalfOpen(inner.state_transitions), false)
                    } else {
                        (Admission::Rejected, false)
                    }
                }
            }
        };

        if transitioned {
            self.persist_best_effort();
        }
        admission
    }

    /// Give back a half-open slot whose call never reported an outcome
    ///
    /// `epoch` is the transition count at admission; a slot taken in an
    /// earlier HALF_OPEN period was already cleared by the transition.
    fn release_half_open_slot(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.state_transitions == epoch {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            debug!(
                breaker = %self.config.name,
                in_flight = inner.half_open_in_flight,
                "Half-open call cancelled before completion, slot released"
            );
        }
    }

    /// Execute an operation through the circuit breaker
    ///
    /// Rejected calls fail with [`BreakerError::Open`]; calls exceeding the
    /// configured timeout fail with [`BreakerError::Timeout`]. Both a timeout
    /// and an operation error count as failures.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let admission = self.admit();
        if let Admission::Rejected = admission {
            let retry_after = self.record_blocked();
            debug!(
                breaker = %self.config.name,
                retry_after_ms = retry_after.as_millis() as u64,
                "Request blocked by open circuit"
            );
            return Err(BreakerError::Open {
                name: self.config.name.clone(),
                retry_after,
            });
        }

        let slot = HalfOpenSlot {
            breaker: self,
            epoch: match admission {
                Admission::HalfOpen(epoch) => Some(epoch),
                _ => None,
            },
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.call_timeout, operation()).await;
        slot.settle();
        match outcome {
            Ok(Ok(value)) => {
                self.record_success(started.elapsed());
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure(&error, started.elapsed());
                Err(BreakerError::Inner(error))
            }
            Err(_) => {
                let timeout = self.config.call_timeout;
                self.record_failure(&format!("call timed out after {:?}", timeout), started.elapsed());
                Err(BreakerError::Timeout {
                    name: self.config.name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Report a successful call made outside of `execute`
    pub fn record_success(&self, latency: Duration) {
        let transitioned = {
            let mut inner = self.inner.lock();
            inner.record_outcome(true, Some(latency), &self.config);

            let state = inner.state;
            match state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                    false
                }
                CircuitState::HalfOpen => {
                    inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        inner.transition_to(CircuitState::Closed, &self.config, "recovery confirmed")
                    } else {
                        false
                    }
                }
                // Late result of a probe admitted before the circuit reopened
                CircuitState::Open => false,
            }
        };

        if transitioned {
            self.persist_best_effort();
        }
    }

    /// Report a failed call made outside of `execute`
    pub fn record_failure(&self, error: &dyn Display, latency: Duration) {
        let transitioned = {
            let mut inner = self.inner.lock();
            inner.record_outcome(false, Some(latency), &self.config);

            warn!(
                breaker = %self.config.name,
                state = ?inner.state,
                error = %error,
                latency_ms = latency.as_millis() as u64,
                "Circuit breaker recorded failure"
            );

            let state = inner.state;
            match state {
                CircuitState::Closed => {
                    inner.failure_count += 1;
                    let window_calls = inner.recent_outcomes.len();
                    let failure_rate = inner.window_failure_rate();

                    if inner.failure_count >= self.config.failure_threshold {
                        inner.transition_to(CircuitState::Open, &self.config, "failure threshold reached")
                    } else if window_calls >= self.config.failure_threshold as usize
                        && failure_rate >= self.config.failure_rate_threshold
                    {
                        inner.transition_to(CircuitState::Open, &self.config, "failure rate threshold reached")
                    } else {
                        false
                    }
                }
                CircuitState::HalfOpen => {
                    inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                    inner.failure_count += 1;
                    inner.recovery_attempts += 1;
                    inner.transition_to(CircuitState::Open, &self.config, "probe failed")
                }
                CircuitState::Open => false,
            }
        };

        if transitioned {
            self.persist_best_effort();
        }
    }

    fn record_blocked(&self) -> Duration {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        inner.blocked_requests += 1;
        inner.retry_after()
    }

    /// Get a snapshot of state and metrics
    pub fn get_status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.lock();
        let retry_after_ms = inner
            .state
            .is_open()
            .then(|| inner.retry_after().as_millis() as u64);

        CircuitBreakerStatus {
            name: self.config.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            recovery_attempts: inner.recovery_attempts,
            half_open_in_flight: inner.half_open_in_flight,
            last_state_change: inner.last_state_change,
            current_recovery_timeout_ms: inner.current_recovery_timeout.as_millis() as u64,
            retry_after_ms,
            metrics: inner.metrics(),
        }
    }

    /// Reset the circuit breaker to a fresh CLOSED state with zeroed metrics
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            *inner = BreakerInner::new(&self.config);
        }
        info!(breaker = %self.config.name, "Circuit breaker reset");
        self.persist_best_effort();
    }

    /// Open the circuit regardless of recent outcomes
    pub fn force_open(&self) {
        let transitioned = self
            .inner
            .lock()
            .transition_to(CircuitState::Open, &self.config, "forced open");
        if transitioned {
            self.persist_best_effort();
        }
    }

    /// Close the circuit regardless of recent outcomes
    pub fn force_close(&self) {
        let transitioned = self
            .inner
            .lock()
            .transition_to(CircuitState::Closed, &self.config, "forced closed");
        if transitioned {
            self.persist_best_effort();
        }
    }

    /// Persist the final snapshot
    pub fn shutdown(&self) {
        self.persist_best_effort();
        debug!(breaker = %self.config.name, "Circuit breaker shut down");
    }

    fn persist_best_effort(&self) {
        let Some(path) = &self.config.persistence_path else {
            return;
        };

        let snapshot = self.inner.lock().snapshot();
        if let Err(e) = snapshot.save(path) {
            warn!(
                breaker = %self.config.name,
                path = %path.display(),
                error = %e,
                "Failed to persist circuit breaker snapshot"
            );
        }
    }
}

enum Admission {
    Rejected,
    Closed,
    /// HALF_OPEN admission, tagged with the transition count at admission
    HalfOpen(u64),
}

/// Half-open slot held across an `execute` await
///
/// Dropping the `execute` future mid-call releases the slot; a completed call
/// settles it and the recorded outcome releases it instead.
struct HalfOpenSlot<'a> {
    breaker: &'a CircuitBreaker,
    epoch: Option<u64>,
}

impl HalfOpenSlot<'_> {
    fn settle(mut self) {
        self.epoch = None;
    }
}

impl Drop for HalfOpenSlot<'_> {
    fn drop(&mut self) {
        if let Some(epoch) = self.epoch {
            self.breaker.release_half_open_slot(epoch);
        }
    }
}
