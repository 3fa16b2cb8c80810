//! Typed balance events and their dispatch
//!
//! Consumers either register a synchronous listener for one [`EventKind`] or
//! take a broadcast receiver that sees every event. A panicking listener is
//! logged and skipped; it never takes the dispatching task down with it.

use crate::types::{BalanceSnapshot, BalanceSource};
use crate::validator::ValidationIssue;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, trace};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Event kinds a listener can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BalanceUpdate,
    BalanceChange,
    WebsocketConnected,
    WebsocketDisconnected,
    FallbackActivated,
    ValidationFailed,
    Error,
}

/// Events emitted by the balance manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BalanceEvent {
    /// A balance was written through cache and history
    BalanceUpdate { snapshot: BalanceSnapshot },
    /// A write moved the balance by at least the change threshold
    BalanceChange {
        asset: String,
        previous: Decimal,
        current: Decimal,
        change: Decimal,
        source: BalanceSource,
    },
    WebsocketConnected,
    WebsocketDisconnected,
    /// A stale value was served because fresh sources failed
    FallbackActivated { asset: Option<String>, reason: String },
    ValidationFailed {
        asset: Option<String>,
        issues: Vec<ValidationIssue>,
    },
    Error { operation: String, message: String },
}

impl BalanceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BalanceEvent::BalanceUpdate { .. } => EventKind::BalanceUpdate,
            BalanceEvent::BalanceChange { .. } => EventKind::BalanceChange,
            BalanceEvent::WebsocketConnected => EventKind::WebsocketConnected,
            BalanceEvent::WebsocketDisconnected => EventKind::WebsocketDisconnected,
            BalanceEvent::FallbackActivated { .. } => EventKind::FallbackActivated,
            BalanceEvent::ValidationFailed { .. } => EventKind::ValidationFailed,
            BalanceEvent::Error { .. } => EventKind::Error,
        }
    }
}

pub type Listener = Arc<dyn Fn(&BalanceEvent) + Send + Sync>;

/// Listener lists per kind plus a broadcast feed
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
    sender: broadcast::Sender<BalanceEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            listeners: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Register a listener, returning how many listeners `kind` now has
    pub fn register<F>(&self, kind: EventKind, listener: F) -> usize
    where
        F: Fn(&BalanceEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write();
        let list = listeners.entry(kind).or_default();
        list.push(Arc::new(listener));
        list.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BalanceEvent> {
        self.sender.subscribe()
    }

    /// Deliver to the kind's listeners, then to broadcast subscribers
    pub fn emit(&self, event: BalanceEvent) {
        let kind = event.kind();
        // listeners run outside the lock so they may register more listeners
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                error!(event = ?kind, "Balance event listener panicked");
            }
        }

        // no subscribers is fine
        if self.sender.send(event).is_err() {
            trace!(event = ?kind, "No broadcast subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listeners_receive_only_their_kind() {
        let bus = EventBus::new();
        let connected = Arc::new(AtomicUsize::new(0));
        {
            let connected = connected.clone();
            bus.register(EventKind::WebsocketConnected, move |_| {
                connected.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.emit(BalanceEvent::WebsocketConnected);
        bus.emit(BalanceEvent::WebsocketDisconnected);
        assert_eq!(connected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register(EventKind::Error, |_| panic!("listener bug"));
        {
            let calls = calls.clone();
            bus.register(EventKind::Error, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.emit(BalanceEvent::Error {
            operation: "refresh".into(),
            message: "boom".into(),
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(EventKind::Error), 2);
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_see_every_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(BalanceEvent::WebsocketConnected);
        bus.emit(BalanceEvent::FallbackActivated {
            asset: Some("BTC".into()),
            reason: "rest unavailable".into(),
        });

        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::WebsocketConnected);
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::FallbackActivated);
    }
}
