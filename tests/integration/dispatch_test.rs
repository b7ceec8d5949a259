//! Integration tests for outbox delivery across restarts

mod common;

use chrono::{Duration, Utc};
use common::{market, RecordingNotifier};
use poly_notify::detector::{AlertEvent, Direction};
use poly_notify::error::PipelineError;
use poly_notify::notify::{DispatchConfig, Dispatcher, Notification};
use poly_notify::state::StateStore;
use rust_decimal_macros::dec;
use tempfile::TempDir;

fn rate_limited(secs: u64) -> Result<(), PipelineError> {
    Err(PipelineError::RateLimited(std::time::Duration::from_secs(secs)))
}

fn alert(id: &str) -> AlertEvent {
    AlertEvent {
        condition_id: id.to_string(),
        question: "Will it happen?".to_string(),
        bucket: "1m".to_string(),
        old_yes: dec!(0.40),
        old_no: dec!(0.60),
        new_yes: dec!(0.47),
        new_no: dec!(0.53),
        direction: Direction::Up,
        observed_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_rate_limited_delivery_waits_for_retry_after() {
    let notifier = RecordingNotifier::default();
    notifier.push_result(rate_limited(5));
    let mut dispatcher = Dispatcher::new(notifier.clone(), DispatchConfig::default());

    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut state = store.load().unwrap();
    let t0 = Utc::now();

    state
        .outbox
        .enqueue(Notification::NewMarket(market("a", "A?")), t0);
    let report = dispatcher.poll(&mut state.outbox, t0).await;
    assert_eq!(report.retried, 1);
    store.save(&state).unwrap();

    for secs in 1..5 {
        let report = dispatcher
            .poll(&mut state.outbox, t0 + Duration::seconds(secs))
            .await;
        assert_eq!(report.delivered, 0, "redelivered after {}s", secs);
    }
    assert!(notifier.sent().is_empty());

    let report = dispatcher
        .poll(&mut state.outbox, t0 + Duration::seconds(5))
        .await;
    assert_eq!(report.delivered, 1);
    assert_eq!(notifier.sent().len(), 1);
    assert!(state.outbox.is_empty());
}

#[tokio::test]
async fn test_pending_notifications_survive_restart() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let t0 = Utc::now();

    let mut state = store.load().unwrap();
    state
        .outbox
        .enqueue(Notification::NewMarket(market("a", "A?")), t0);
    state
        .outbox
        .enqueue(Notification::MarketClosed(market("a", "A?")), t0);
    store.save(&state).unwrap();

    // A fresh process with a fresh dispatcher delivers in queue order
    let notifier = RecordingNotifier::default();
    let mut dispatcher = Dispatcher::new(notifier.clone(), DispatchConfig::default());
    let mut state = store.load().unwrap();
    let report = dispatcher.poll(&mut state.outbox, t0).await;
    store.save(&state).unwrap();

    assert_eq!(report.delivered, 2);
    let sent = notifier.sent();
    assert!(sent[0].starts_with("🆕"));
    assert!(sent[1].starts_with("🔒"));
    assert!(store.load().unwrap().outbox.is_empty());
}

#[tokio::test]
async fn test_exhausted_delivery_is_dropped_and_degraded() {
    let notifier = RecordingNotifier::default();
    for _ in 0..3 {
        notifier.push_result(Err(PipelineError::TransientNetwork("reset".to_string())));
    }
    let mut dispatcher = Dispatcher::new(
        notifier.clone(),
        DispatchConfig {
            max_attempts: 3,
            max_rate_limits: 10,
            initial_backoff: Duration::seconds(1),
            max_backoff: Duration::seconds(2),
        },
    );

    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut state = store.load().unwrap();
    let t0 = Utc::now();
    state
        .outbox
        .enqueue(Notification::NewMarket(market("a", "A?")), t0);

    let mut failed = 0;
    for secs in [0, 1, 3] {
        let report = dispatcher
            .poll(&mut state.outbox, t0 + Duration::seconds(secs))
            .await;
        failed += report.failed;
    }

    assert_eq!(failed, 1);
    assert!(state.outbox.is_empty());
    assert!(dispatcher.is_degraded());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_provider_stuck_on_rate_limits_is_given_up() {
    let notifier = RecordingNotifier::default();
    for _ in 0..50 {
        notifier.push_result(rate_limited(1));
    }
    let mut dispatcher = Dispatcher::new(
        notifier.clone(),
        DispatchConfig {
            max_attempts: 3,
            max_rate_limits: 3,
            ..Default::default()
        },
    );

    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let mut state = store.load().unwrap();
    let t0 = Utc::now();
    state
        .outbox
        .enqueue(Notification::PriceMove(alert("a")), t0);

    let mut failed = 0;
    for secs in 0..50 {
        let report = dispatcher
            .poll(&mut state.outbox, t0 + Duration::seconds(secs))
            .await;
        failed += report.failed;
        if report.changed() {
            store.save(&state).unwrap();
        }
    }

    assert_eq!(failed, 1);
    assert!(dispatcher.is_degraded());
    assert_eq!(dispatcher.stats().rate_limited, 3);
    assert!(store.load().unwrap().outbox.is_empty());
}
