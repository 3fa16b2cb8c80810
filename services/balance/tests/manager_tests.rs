//! BalanceManager behavior against in-memory sources

mod common;

use balance_service::{
    BalanceEvent, BalanceManager, BalanceManagerConfig, BalanceSource, EventKind, ManagerState,
    StreamEvent, TrendDirection, ValidationRule,
};
use common::{init_tracing, test_config, EventLog, MockRest, MockStream};
use resilience::CircuitState;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

fn manager(stream: &std::sync::Arc<MockStream>, rest: &std::sync::Arc<MockRest>, config: BalanceManagerConfig) -> BalanceManager {
    BalanceManager::new(stream.clone(), rest.clone(), config).unwrap()
}

#[tokio::test]
async fn test_rest_refresh_populates_cache_and_history() {
    init_tracing();
    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[("USDT", dec!(123.45))]);
    let manager = manager(&stream, &rest, test_config());
    assert!(manager.initialize().await);

    let balances = manager.get_all_balances(true).await;
    let usdt = balances.get("USDT").expect("USDT present");
    assert_eq!(usdt.balance, dec!(123.45));
    assert_eq!(usdt.hold, dec!(0));
    assert_eq!(usdt.free, dec!(123.45));
    assert_eq!(usdt.source, BalanceSource::Rest);

    let cached = manager.get_balance("USDT", false).await.unwrap();
    assert_eq!(cached.source, BalanceSource::Cache);
    assert_eq!(cached.free, cached.balance - cached.hold);

    let history = manager.get_balance_history("USDT", None, None).await;
    assert_eq!(history[0].balance, dec!(123.45));
    assert_eq!(history[0].source, BalanceSource::Rest);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_stream_delta_fires_change_only_above_threshold() {
    let stream = MockStream::authenticated();
    stream.set_balance("BTC", dec!(1.0), dec!(0));
    let rest = MockRest::with_balances(&[]);
    let manager = manager(&stream, &rest, test_config());
    assert!(manager.initialize().await);
    assert_eq!(rest.calls(), 0, "authenticated feed serves the initial load");

    let log = EventLog::attach(&manager, &[EventKind::BalanceUpdate, EventKind::BalanceChange]);

    stream.push_balance("BTC", dec!(1.2), dec!(0));
    assert!(log.wait_for(EventKind::BalanceUpdate, 1).await);
    assert_eq!(log.count(EventKind::BalanceChange), 1);
    let change = log
        .all()
        .into_iter()
        .find_map(|event| match event {
            BalanceEvent::BalanceChange { previous, current, change, .. } => Some((previous, current, change)),
            _ => None,
        })
        .unwrap();
    assert_eq!(change, (dec!(1.0), dec!(1.2), dec!(0.2)));

    stream.push_balance("BTC", dec!(1.2001), dec!(0));
    assert!(log.wait_for(EventKind::BalanceUpdate, 2).await);
    assert_eq!(log.count(EventKind::BalanceChange), 1);

    let btc = manager.get_balance("BTC", false).await.unwrap();
    assert_eq!(btc.balance, dec!(1.2001));
    assert_eq!(manager.get_status().await.counters.stream_updates, 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_rest_failure_serves_stale_history_value() {
    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[("BTC", dec!(2.5))]);
    let manager = manager(&stream, &rest, test_config());
    manager.initialize().await;

    let log = EventLog::attach(&manager, &[EventKind::FallbackActivated, EventKind::Error]);
    rest.failing.store(true, Ordering::SeqCst);

    let btc = manager.refresh_balance("BTC").await.expect("stale value served");
    assert_eq!(btc.balance, dec!(2.5));
    assert_eq!(btc.source, BalanceSource::Rest);
    assert_eq!(log.count(EventKind::FallbackActivated), 1);
    assert_eq!(log.count(EventKind::Error), 1);

    assert!(manager.get_balance("DOGE", true).await.is_none());
    assert_eq!(manager.get_status().await.counters.fallbacks, 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_open_breaker_short_circuits_rest() {
    let stream = MockStream::disconnected();
    let rest = MockRest::failing();
    let mut config = test_config();
    config.circuit_breaker.failure_threshold = 2;
    let manager = manager(&stream, &rest, config);

    // a failed initial load still leaves the manager running
    assert!(manager.initialize().await);
    assert_eq!(manager.state(), ManagerState::Running);

    assert!(manager.get_balance("BTC", true).await.is_none());
    assert_eq!(rest.calls(), 2);
    assert_eq!(manager.circuit_breaker_status().state, CircuitState::Open);

    assert!(manager.get_balance("BTC", true).await.is_none());
    assert_eq!(rest.calls(), 2, "open breaker must not reach REST");

    let status = manager.get_status().await;
    assert!(!status.rest_available);
    assert_eq!(status.counters.rest_failures, 3);
    assert_eq!(status.circuit_breaker.metrics.blocked_requests, 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_rate_limited_rest_is_not_a_breaker_failure() {
    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[("BTC", dec!(1))]);
    let config = BalanceManagerConfig {
        rest_requests_per_minute: 1,
        ..test_config()
    };
    let manager = manager(&stream, &rest, config);
    manager.initialize().await;
    assert_eq!(rest.calls(), 1);

    let btc = manager.get_balance("BTC", true).await.unwrap();
    assert_eq!(btc.balance, dec!(1));
    assert_eq!(rest.calls(), 1);

    let breaker = manager.circuit_breaker_status();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.failure_count, 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_lifecycle_transitions() {
    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[("ETH", dec!(3))]);
    let manager = manager(&stream, &rest, test_config());
    assert_eq!(manager.state(), ManagerState::Uninitialized);

    assert!(manager.initialize().await);
    assert!(!manager.initialize().await);
    assert_eq!(manager.state(), ManagerState::Running);

    manager.shutdown().await;
    assert_eq!(manager.state(), ManagerState::Stopped);
    manager.shutdown().await;
    assert_eq!(manager.state(), ManagerState::Stopped);

    // store is gone; reads degrade to nothing instead of failing
    assert!(manager.get_balance("ETH", false).await.is_none());
    assert!(!manager.initialize().await);
}

#[tokio::test]
async fn test_history_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = BalanceManagerConfig {
        history_snapshot_path: Some(dir.path().join("history.json")),
        ..test_config()
    };

    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[("USDT", dec!(10))]);
    let first = manager(&stream, &rest, config.clone());
    first.initialize().await;
    first.shutdown().await;
    assert!(dir.path().join("history.json").exists());

    let failing = MockRest::failing();
    let second = manager(&stream, &failing, config);
    second.initialize().await;

    let usdt = second.get_balance("USDT", false).await.expect("restored from history");
    assert_eq!(usdt.balance, dec!(10));
    assert_eq!(second.get_balance_history("USDT", None, None).await.len(), 1);

    second.shutdown().await;
}

#[tokio::test]
async fn test_stream_connection_events() {
    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[]);
    let manager = manager(&stream, &rest, test_config());
    manager.initialize().await;
    let log = EventLog::attach(
        &manager,
        &[EventKind::WebsocketConnected, EventKind::WebsocketDisconnected],
    );

    stream.connected.store(true, Ordering::SeqCst);
    stream.push(StreamEvent::Connected);
    assert!(log.wait_for(EventKind::WebsocketConnected, 1).await);

    stream.authenticated.store(true, Ordering::SeqCst);
    stream.push(StreamEvent::Authenticated);
    for _ in 0..100 {
        if stream.subscribe_calls.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(stream.subscribe_calls.load(Ordering::SeqCst), 1);

    stream.connected.store(false, Ordering::SeqCst);
    stream.push(StreamEvent::Disconnected);
    stream.push(StreamEvent::Disconnected);
    assert!(log.wait_for(EventKind::WebsocketDisconnected, 1).await);
    assert_eq!(log.count(EventKind::WebsocketConnected), 1);

    manager.shutdown().await;
    assert_eq!(log.count(EventKind::WebsocketDisconnected), 1);
}

#[tokio::test]
async fn test_health_monitor_detects_silent_disconnect() {
    let stream = MockStream::authenticated();
    let rest = MockRest::with_balances(&[]);
    let config = BalanceManagerConfig {
        health_check_interval_secs: 1,
        ..test_config()
    };
    let manager = manager(&stream, &rest, config);
    manager.initialize().await;
    let log = EventLog::attach(&manager, &[EventKind::WebsocketDisconnected]);

    stream.connected.store(false, Ordering::SeqCst);
    let mut seen = false;
    for _ in 0..3 {
        if log.wait_for(EventKind::WebsocketDisconnected, 1).await {
            seen = true;
            break;
        }
    }
    assert!(seen, "health monitor should notice the dropped feed");
    assert!(!manager.get_status().await.stream_connected);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_invalid_update_is_flagged_but_kept() {
    let stream = MockStream::authenticated();
    let rest = MockRest::with_balances(&[]);
    let manager = manager(&stream, &rest, test_config());
    manager.initialize().await;
    let log = EventLog::attach(&manager, &[EventKind::BalanceUpdate, EventKind::ValidationFailed]);

    stream.push_balance("XRP", dec!(-1), dec!(0));
    assert!(log.wait_for(EventKind::BalanceUpdate, 1).await);
    assert_eq!(log.count(EventKind::ValidationFailed), 1);

    let xrp = manager.get_balance("XRP", false).await.unwrap();
    assert_eq!(xrp.balance, dec!(-1));
    assert_eq!(xrp.source, BalanceSource::Cache);

    let result = manager.validate_all_balances().await;
    assert!(!result.is_valid);
    assert!(result.has_rule(ValidationRule::NegativeBalance));
    assert_eq!(manager.get_status().await.counters.validation_failures, 3);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_trend_over_streamed_updates() {
    let stream = MockStream::authenticated();
    let rest = MockRest::with_balances(&[]);
    let manager = manager(&stream, &rest, test_config());
    manager.initialize().await;
    let mut events = manager.subscribe();

    for value in [dec!(100), dec!(105), dec!(110), dec!(115), dec!(120)] {
        stream.push_balance("ETH", value, dec!(0));
    }
    let mut updates = 0;
    while updates < 5 {
        match events.recv().await.unwrap() {
            BalanceEvent::BalanceUpdate { snapshot } => {
                assert_eq!(snapshot.source, BalanceSource::Stream);
                updates += 1;
            }
            other => assert_eq!(other.kind(), EventKind::BalanceChange),
        }
    }

    let trend = manager.analyze_balance_trend("ETH", 1).await.unwrap();
    assert_eq!(trend.direction, TrendDirection::Increasing);
    assert!(trend.strength > 0.99);
    assert_eq!(trend.data_points, 5);

    let changes = manager.get_balance_changes("ETH", None, Some(dec!(5))).await;
    assert_eq!(changes.len(), 4);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_get_all_prefers_cache_then_validates() {
    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[("BTC", dec!(1)), ("ETH", dec!(2))]);
    let manager = manager(&stream, &rest, test_config());
    manager.initialize().await;

    let cached = manager.get_all_balances(false).await;
    assert_eq!(cached.len(), 2);
    assert!(cached.values().all(|s| s.source == BalanceSource::Cache));
    assert_eq!(rest.calls(), 1);

    let result = manager.validate_all_balances().await;
    assert!(result.is_valid);
    assert_eq!(result.assets_validated, 2);

    let status = manager.get_status().await;
    assert_eq!(status.state, ManagerState::Running);
    assert_eq!(status.cache.unwrap().size, 2);
    assert_eq!(status.history.unwrap().assets_tracked, 2);
    assert_eq!(status.counters.cache_hits, 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_feed_forces_periodic_rest_refresh() {
    let stream = MockStream::disconnected();
    let rest = MockRest::with_balances(&[("USDT", dec!(500))]);
    let config = BalanceManagerConfig {
        force_update_interval_secs: 30,
        ..test_config()
    };
    let manager = manager(&stream, &rest, config);
    let log = EventLog::attach(&manager, &[EventKind::BalanceUpdate]);
    manager.initialize().await;
    assert_eq!(rest.calls(), 1);

    tokio::time::sleep(std::time::Duration::from_secs(31)).await;
    assert_eq!(rest.calls(), 2);
    assert!(log.wait_for(EventKind::BalanceUpdate, 2).await);

    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    assert_eq!(rest.calls(), 3);
    assert!(log.wait_for(EventKind::BalanceUpdate, 3).await);

    let history = manager.get_balance_history("USDT", None, None).await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|entry| entry.source == BalanceSource::Rest));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_active_feed_skips_forced_refresh() {
    let stream = MockStream::authenticated();
    let rest = MockRest::with_balances(&[("BTC", dec!(1))]);
    let config = BalanceManagerConfig {
        force_update_interval_secs: 30,
        ..test_config()
    };
    let manager = manager(&stream, &rest, config);
    let log = EventLog::attach(&manager, &[EventKind::BalanceUpdate]);
    manager.initialize().await;
    assert_eq!(rest.calls(), 1, "empty feed snapshot falls through to REST");

    tokio::time::sleep(std::time::Duration::from_secs(25)).await;
    stream.push_balance("BTC", dec!(1.5), dec!(0));
    assert!(log.wait_for(EventKind::BalanceUpdate, 2).await);

    // Tick at 30s sees an update 5s old
    tokio::time::sleep(std::time::Duration::from_secs(6)).await;
    assert_eq!(rest.calls(), 1);

    // Tick at 60s sees the feed silent for 35s
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    assert_eq!(rest.calls(), 2);

    manager.shutdown().await;
}
