//! Integration tests for resumable market discovery

mod common;

use chrono::Utc;
use common::{market, FakeListing};
use poly_notify::config::TrackingConfig;
use poly_notify::discovery::{Crawler, CrawlerConfig};
use poly_notify::error::PipelineError;
use poly_notify::market::{TrackingFilter, END_CURSOR, ORIGIN_CURSOR};
use poly_notify::notify::Notification;
use poly_notify::state::StateStore;
use tempfile::TempDir;

fn crawler(listing: &FakeListing) -> Crawler<FakeListing> {
    let filter = TrackingFilter::new(&TrackingConfig {
        keywords: vec!["election".to_string()],
        ..Default::default()
    });
    Crawler::new(
        listing.clone(),
        filter,
        CrawlerConfig {
            announce_initial: true,
        },
    )
}

fn three_pages(listing: &FakeListing) {
    listing.page(
        ORIGIN_CURSOR,
        vec![market("a", "Who wins the election?"), market("x", "Rain tomorrow?")],
        Some("c1"),
    );
    listing.page("c1", vec![market("b", "Senate election winner?")], Some("c2"));
    listing.page("c2", vec![market("c", "Election turnout above 60%?")], Some(END_CURSOR));
}

fn new_market_ids(notifications: impl Iterator<Item = Notification>) -> Vec<String> {
    notifications
        .filter_map(|n| match n {
            Notification::NewMarket(m) => Some(m.condition_id),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_cursor() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let listing = FakeListing::default();
    three_pages(&listing);
    listing.fail_on("c2");

    // First process: dies on the last page
    {
        let store = StateStore::new(&path);
        let mut state = store.load().unwrap();
        let result = crawler(&listing).discover(&mut state, &store, false, Utc::now()).await;
        assert!(matches!(result, Err(PipelineError::TransientNetwork(_))));
    }

    // Second process: resumes at the failed page only
    listing.heal();
    listing.clear_calls();
    let store = StateStore::new(&path);
    let mut state = store.load().unwrap();
    assert_eq!(state.cursor.as_ref().unwrap().token, "c2");

    let report = crawler(&listing)
        .discover(&mut state, &store, false, Utc::now())
        .await
        .unwrap();
    assert_eq!(listing.calls(), vec!["c2".to_string()]);
    assert!(report.completed_full_pass);
    assert_eq!(report.new.len(), 1);

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded, state);
    assert!(reloaded.bootstrapped);
    assert_eq!(reloaded.tracked.len(), 3);
    assert_eq!(reloaded.seen.len(), 4);

    let mut announced = new_market_ids(reloaded.outbox.iter().map(|q| q.notification.clone()));
    announced.sort();
    assert_eq!(announced, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_replay_after_restart_reports_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let listing = FakeListing::default();
    three_pages(&listing);

    let store = StateStore::new(&path);
    let mut state = store.load().unwrap();
    crawler(&listing)
        .discover(&mut state, &store, false, Utc::now())
        .await
        .unwrap();
    let outbox_len = state.outbox.len();

    // Restart and run again: only the tail page is re-read
    listing.clear_calls();
    let mut state = store.load().unwrap();
    let report = crawler(&listing)
        .discover(&mut state, &store, false, Utc::now())
        .await
        .unwrap();

    assert_eq!(listing.calls(), vec!["c2".to_string()]);
    assert!(report.new.is_empty());
    assert!(report.closed.is_empty());
    assert_eq!(state.outbox.len(), outbox_len);
}

#[tokio::test]
async fn test_new_listing_on_tail_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let listing = FakeListing::default();
    three_pages(&listing);

    let mut state = store.load().unwrap();
    crawler(&listing)
        .discover(&mut state, &store, false, Utc::now())
        .await
        .unwrap();

    listing.page(
        "c2",
        vec![
            market("c", "Election turnout above 60%?"),
            market("d", "Election called by midnight?"),
        ],
        Some(END_CURSOR),
    );
    let report = crawler(&listing)
        .discover(&mut state, &store, false, Utc::now())
        .await
        .unwrap();

    assert_eq!(report.new.len(), 1);
    assert_eq!(report.new[0].condition_id, "d");
}

#[tokio::test]
async fn test_market_absent_from_two_full_passes_is_closed() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let listing = FakeListing::default();
    three_pages(&listing);

    let mut state = store.load().unwrap();
    let crawler = crawler(&listing);
    crawler
        .discover(&mut state, &store, false, Utc::now())
        .await
        .unwrap();

    // "b" is delisted
    listing.page("c1", vec![], Some("c2"));

    let report = crawler
        .discover(&mut state, &store, true, Utc::now())
        .await
        .unwrap();
    assert!(report.closed.is_empty());
    assert!(state.tracked.contains_key("b"));

    let report = crawler
        .discover(&mut state, &store, true, Utc::now())
        .await
        .unwrap();
    assert_eq!(report.closed.len(), 1);
    assert_eq!(report.closed[0].condition_id, "b");
    assert!(!state.tracked.contains_key("b"));
    assert!(!state.is_seen("b"));

    let closed: Vec<_> = state
        .outbox
        .iter()
        .filter(|q| matches!(q.notification, Notification::MarketClosed(_)))
        .collect();
    assert_eq!(closed.len(), 1);
}

#[tokio::test]
async fn test_persistence_failure_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"x").unwrap();
    let store = StateStore::new(blocker.join("state.json"));

    let listing = FakeListing::default();
    three_pages(&listing);

    let mut state = poly_notify::state::PersistedState::default();
    let before = state.clone();
    let result = crawler(&listing)
        .discover(&mut state, &store, false, Utc::now())
        .await;

    assert!(matches!(result, Err(PipelineError::Persistence(_))));
    assert_eq!(state, before);
    assert!(state.cursor.is_none());
    assert!(state.seen.is_empty());
}
