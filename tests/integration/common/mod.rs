//! In-process fakes shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poly_notify::error::PipelineError;
use poly_notify::market::{
    HistoryPoint, Market, MarketListing, MarketPage, PriceHistory, END_CURSOR,
};
use poly_notify::notify::Notifier;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

pub fn market(id: &str, question: &str) -> Market {
    Market {
        condition_id: id.to_string(),
        question: question.to_string(),
        yes_token_id: format!("{}-yes", id),
        no_token_id: format!("{}-no", id),
        yes_outcome: "Yes".to_string(),
        no_outcome: "No".to_string(),
        yes_price: None,
        no_price: None,
        tags: vec![],
        close_time: None,
        volume: None,
        active: true,
        closed: false,
        accepting_orders: true,
    }
}

#[derive(Default)]
struct ListingInner {
    pages: HashMap<String, (Vec<Market>, Option<String>)>,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// Listing served from memory, shareable across crawler instances
#[derive(Clone, Default)]
pub struct FakeListing {
    inner: Arc<Mutex<ListingInner>>,
}

impl FakeListing {
    pub fn page(&self, cursor: &str, markets: Vec<Market>, next: Option<&str>) {
        self.inner
            .lock()
            .unwrap()
            .pages
            .insert(cursor.to_string(), (markets, next.map(String::from)));
    }

    pub fn fail_on(&self, cursor: &str) {
        self.inner.lock().unwrap().failing.insert(cursor.to_string());
    }

    pub fn heal(&self) {
        self.inner.lock().unwrap().failing.clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }
}

#[async_trait]
impl MarketListing for FakeListing {
    async fn fetch_page(&self, cursor: &str) -> Result<MarketPage, PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(cursor.to_string());
        if inner.failing.contains(cursor) {
            return Err(PipelineError::TransientNetwork("connection reset".into()));
        }
        let (markets, next) = inner
            .pages
            .get(cursor)
            .cloned()
            .unwrap_or((vec![], Some(END_CURSOR.to_string())));
        Ok(MarketPage {
            markets,
            skipped: 0,
            next_cursor: next,
        })
    }
}

/// Token price histories served from memory
#[derive(Clone, Default)]
pub struct FakeHistory {
    history: Arc<Mutex<HashMap<String, Vec<HistoryPoint>>>>,
}

impl FakeHistory {
    pub fn set(&self, token_id: &str, points: &[(DateTime<Utc>, Decimal)]) {
        self.history.lock().unwrap().insert(
            token_id.to_string(),
            points
                .iter()
                .map(|(timestamp, price)| HistoryPoint {
                    timestamp: *timestamp,
                    price: *price,
                })
                .collect(),
        );
    }
}

#[async_trait]
impl PriceHistory for FakeHistory {
    async fn fetch_history(
        &self,
        token_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoryPoint>, PipelineError> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(token_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= start && p.timestamp <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Notifier that replays scripted results and records what it delivered
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    script: Arc<Mutex<VecDeque<Result<(), PipelineError>>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn push_result(&self, result: Result<(), PipelineError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, text: &str) -> Result<(), PipelineError> {
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if next.is_ok() {
            self.sent.lock().unwrap().push(text.to_string());
        }
        next
    }
}
