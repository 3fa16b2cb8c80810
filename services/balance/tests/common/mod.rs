//! Shared mocks for balance manager integration tests

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use balance_service::{
    BalanceEvent, BalanceManager, BalanceManagerConfig, BalanceRestClient, BalanceStream, EventKind,
    StreamBalance, StreamEvent,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory push feed
pub struct MockStream {
    pub connected: AtomicBool,
    pub authenticated: AtomicBool,
    pub balances: Mutex<HashMap<String, StreamBalance>>,
    pub subscribe_calls: AtomicU32,
    events: broadcast::Sender<StreamEvent>,
}

impl MockStream {
    pub fn disconnected() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            connected: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            balances: Mutex::new(HashMap::new()),
            subscribe_calls: AtomicU32::new(0),
            events,
        })
    }

    pub fn authenticated() -> Arc<Self> {
        let stream = Self::disconnected();
        stream.connected.store(true, Ordering::SeqCst);
        stream.authenticated.store(true, Ordering::SeqCst);
        stream
    }

    pub fn set_balance(&self, asset: &str, balance: Decimal, hold: Decimal) {
        self.balances
            .lock()
            .insert(asset.to_string(), StreamBalance::new(asset, balance, hold));
    }

    /// Deliver an unsolicited event to subscribers
    pub fn push(&self, event: StreamEvent) {
        let _ = self.events.send(event);
    }

    pub fn push_balance(&self, asset: &str, balance: Decimal, hold: Decimal) {
        self.set_balance(asset, balance, hold);
        self.push(StreamEvent::Balance(vec![StreamBalance::new(asset, balance, hold)]));
    }
}

#[async_trait]
impl BalanceStream for MockStream {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn subscribe_balance(&self) -> bool {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    async fn get_balance(&self, asset: &str) -> Option<StreamBalance> {
        self.balances.lock().get(asset).cloned()
    }

    async fn get_all_balances(&self) -> Option<HashMap<String, StreamBalance>> {
        let balances = self.balances.lock().clone();
        if balances.is_empty() {
            None
        } else {
            Some(balances)
        }
    }
}

/// REST endpoint with switchable failure
pub struct MockRest {
    pub balances: Mutex<HashMap<String, Decimal>>,
    pub failing: AtomicBool,
    pub calls: AtomicU32,
}

impl MockRest {
    pub fn with_balances(balances: &[(&str, Decimal)]) -> Arc<Self> {
        Arc::new(Self {
            balances: Mutex::new(
                balances
                    .iter()
                    .map(|(asset, amount)| (asset.to_string(), *amount))
                    .collect(),
            ),
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        let rest = Self::with_balances(&[]);
        rest.failing.store(true, Ordering::SeqCst);
        rest
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceRestClient for MockRest {
    async fn fetch_balances(&self) -> anyhow::Result<HashMap<String, Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("HTTP 503 Service Unavailable"));
        }
        Ok(self.balances.lock().clone())
    }
}

/// Events captured per kind
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<BalanceEvent>>>,
}

impl EventLog {
    pub fn attach(manager: &BalanceManager, kinds: &[EventKind]) -> Self {
        let log = Self::default();
        for kind in kinds {
            let events = log.events.clone();
            manager.register_callback(*kind, move |event| events.lock().push(event.clone()));
        }
        log
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    pub fn all(&self) -> Vec<BalanceEvent> {
        self.events.lock().clone()
    }

    /// Poll until `kind` has been seen `expected` times or the timeout passes
    pub async fn wait_for(&self, kind: EventKind, expected: usize) -> bool {
        for _ in 0..100 {
            if self.count(kind) >= expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

/// Defaults with background intervals pushed out of the way of short tests
pub fn test_config() -> BalanceManagerConfig {
    BalanceManagerConfig {
        force_update_interval_secs: 3600,
        housekeeping_interval_secs: 3600,
        shutdown_grace_ms: 500,
        ..Default::default()
    }
}
