//! End-to-end pipeline tests: discovery, price detection and delivery

mod common;

use chrono::{Duration, Utc};
use common::{market, FakeHistory, FakeListing, RecordingNotifier};
use poly_notify::config::TrackingConfig;
use poly_notify::detector::{Bucket, ChangeDetector, Direction};
use poly_notify::discovery::{Crawler, CrawlerConfig};
use poly_notify::market::{TrackingFilter, END_CURSOR, ORIGIN_CURSOR};
use poly_notify::notify::{DispatchConfig, Dispatcher};
use poly_notify::prices::{PriceSeriesStore, RefreshConfig};
use poly_notify::scheduler::{Components, Scheduler, SchedulerConfig};
use poly_notify::state::{PersistedState, StateStore};
use rust_decimal_macros::dec;
use std::path::Path;
use tempfile::TempDir;

type TestScheduler = Scheduler<FakeListing, FakeHistory, RecordingNotifier>;

fn scheduler(
    path: &Path,
    state: PersistedState,
    listing: &FakeListing,
    history: &FakeHistory,
    notifier: &RecordingNotifier,
) -> TestScheduler {
    let filter = TrackingFilter::new(&TrackingConfig {
        tags: vec!["Politics".to_string()],
        ..Default::default()
    });
    let detector = ChangeDetector::new(vec![
        Bucket::new("1m", Duration::minutes(1), dec!(0.05)),
        Bucket::new("1h", Duration::hours(1), dec!(0.10)),
    ])
    .with_overrides(filter.price_deltas());

    Scheduler::new(
        SchedulerConfig::default(),
        StateStore::new(path),
        state,
        Components {
            crawler: Crawler::new(listing.clone(), filter, CrawlerConfig::default()),
            history: history.clone(),
            prices: PriceSeriesStore::new(RefreshConfig::default()),
            detector,
            dispatcher: Dispatcher::new(notifier.clone(), DispatchConfig::default()),
        },
    )
}

fn politics(id: &str, question: &str) -> poly_notify::market::Market {
    let mut m = market(id, question);
    m.tags = vec!["Politics".to_string()];
    m
}

#[tokio::test]
async fn test_price_move_alert_delivered_and_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let listing = FakeListing::default();
    listing.page(
        ORIGIN_CURSOR,
        vec![politics("a", "Will the incumbent win?"), market("x", "Rain?")],
        Some(END_CURSOR),
    );

    let now = Utc::now();
    let history = FakeHistory::default();
    history.set(
        "a-yes",
        &[(now - Duration::seconds(120), dec!(0.40)), (now - Duration::seconds(10), dec!(0.47))],
    );
    history.set(
        "a-no",
        &[(now - Duration::seconds(120), dec!(0.60)), (now - Duration::seconds(10), dec!(0.53))],
    );

    let notifier = RecordingNotifier::default();
    let mut scheduler = scheduler(&path, PersistedState::default(), &listing, &history, &notifier);

    // Bootstrap pass tracks the market without announcing it
    let report = scheduler.run_discovery().await.unwrap();
    assert_eq!(report.new.len(), 1);
    assert!(scheduler.state().outbox.is_empty());

    let alerts = scheduler.run_detection().await.unwrap();
    assert_eq!(alerts.len(), 1, "only the 1m bucket moved past its threshold");
    assert_eq!(alerts[0].bucket, "1m");
    assert_eq!(alerts[0].direction, Direction::Up);
    assert_eq!(scheduler.state().outbox.len(), 1);

    // Alert and watermark hit the disk before delivery
    let saved = StateStore::new(&path).load().unwrap();
    assert_eq!(saved.outbox.len(), 1);
    let wm = saved.watermark("a", "1m").unwrap();
    assert_eq!((wm.yes, wm.no), (dec!(0.47), dec!(0.53)));

    let report = scheduler.run_dispatch().await.unwrap();
    assert_eq!(report.delivered, 1);
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Price Change Alert"));
    assert!(sent[0].contains("Will the incumbent win?"));

    // Buckets are not re-evaluated before their horizon elapses
    let alerts = scheduler.run_detection().await.unwrap();
    assert!(alerts.is_empty());

    let saved = StateStore::new(&path).load().unwrap();
    assert!(saved.outbox.is_empty());
}

#[tokio::test]
async fn test_same_sign_moves_do_not_alert() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let listing = FakeListing::default();
    listing.page(ORIGIN_CURSOR, vec![politics("a", "Q?")], Some(END_CURSOR));

    let now = Utc::now();
    let history = FakeHistory::default();
    history.set(
        "a-yes",
        &[(now - Duration::seconds(120), dec!(0.40)), (now - Duration::seconds(10), dec!(0.50))],
    );
    history.set(
        "a-no",
        &[(now - Duration::seconds(120), dec!(0.40)), (now - Duration::seconds(10), dec!(0.50))],
    );

    let notifier = RecordingNotifier::default();
    let mut scheduler = scheduler(&path, PersistedState::default(), &listing, &history, &notifier);
    scheduler.run_discovery().await.unwrap();

    let alerts = scheduler.run_detection().await.unwrap();
    assert!(alerts.is_empty());
    assert!(scheduler.state().watermark("a", "1m").is_none());
}

#[tokio::test]
async fn test_new_and_closed_markets_after_bootstrap() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let listing = FakeListing::default();
    listing.page(ORIGIN_CURSOR, vec![politics("a", "First?")], Some(END_CURSOR));

    let history = FakeHistory::default();
    let notifier = RecordingNotifier::default();
    let mut scheduler = scheduler(&path, PersistedState::default(), &listing, &history, &notifier);
    scheduler.run_discovery().await.unwrap();

    // A new listing appears on the tail page and "a" resolves
    let mut resolved = politics("a", "First?");
    resolved.closed = true;
    listing.page(
        ORIGIN_CURSOR,
        vec![resolved, politics("b", "Second?")],
        Some(END_CURSOR),
    );
    let report = scheduler.run_discovery().await.unwrap();
    assert_eq!(report.new.len(), 1);
    assert_eq!(report.closed.len(), 1);

    scheduler.run_dispatch().await.unwrap();
    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().any(|s| s.starts_with("🔒 Market Closed") && s.contains("First?")));
    assert!(sent.iter().any(|s| s.starts_with("🆕 New Market Found!") && s.contains("Second?")));

    assert!(!scheduler.state().tracked.contains_key("a"));
    assert!(scheduler.state().tracked.contains_key("b"));
}

#[tokio::test]
async fn test_restart_keeps_watermarks_and_outbox() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let listing = FakeListing::default();
    listing.page(ORIGIN_CURSOR, vec![politics("a", "Q?")], Some(END_CURSOR));

    let now = Utc::now();
    let history = FakeHistory::default();
    history.set(
        "a-yes",
        &[(now - Duration::seconds(120), dec!(0.40)), (now - Duration::seconds(10), dec!(0.47))],
    );
    history.set(
        "a-no",
        &[(now - Duration::seconds(120), dec!(0.60)), (now - Duration::seconds(10), dec!(0.53))],
    );

    // Provider is down for the first process
    let notifier = RecordingNotifier::default();
    notifier.push_result(Err(poly_notify::error::PipelineError::TransientNetwork(
        "down".to_string(),
    )));
    {
        let mut first = scheduler(&path, PersistedState::default(), &listing, &history, &notifier);
        first.run_discovery().await.unwrap();
        assert_eq!(first.run_detection().await.unwrap().len(), 1);
        let report = first.run_dispatch().await.unwrap();
        assert_eq!(report.retried, 1);
    }

    // Second process picks up the pending alert and the watermark
    let state = StateStore::new(&path).load().unwrap();
    assert_eq!(state.outbox.len(), 1);
    assert_eq!(state.outbox.iter().next().unwrap().attempts, 1);

    let mut second = scheduler(&path, state, &listing, &history, &notifier);
    let alerts = second.run_detection().await.unwrap();
    assert!(alerts.is_empty(), "watermark suppresses a repeat alert");
}
