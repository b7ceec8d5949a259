//! Notification types

use crate::detector::AlertEvent;
use crate::market::Market;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Something the user should hear about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A tracked market appeared in the listing
    NewMarket(Market),
    /// A tracked market resolved, closed or vanished
    MarketClosed(Market),
    /// A tracked market moved past a bucket threshold
    PriceMove(AlertEvent),
}

impl Notification {
    /// Ordering key: notifications sharing a key are delivered FIFO
    pub fn key(&self) -> String {
        match self {
            Notification::NewMarket(m) | Notification::MarketClosed(m) => m.condition_id.clone(),
            Notification::PriceMove(e) => format!("{}/{}", e.condition_id, e.bucket),
        }
    }

    pub fn condition_id(&self) -> &str {
        match self {
            Notification::NewMarket(m) | Notification::MarketClosed(m) => &m.condition_id,
            Notification::PriceMove(e) => &e.condition_id,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::NewMarket(_) => "new_market",
            Notification::MarketClosed(_) => "market_closed",
            Notification::PriceMove(_) => "price_move",
        }
    }
}

/// A notification waiting in the outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub id: Uuid,
    pub notification: Notification,
    /// Failed delivery attempts so far
    pub attempts: u32,
    /// Rate-limit responses so far, counted apart from failures
    #[serde(default)]
    pub rate_limits: u32,
    pub queued_at: DateTime<Utc>,
    /// Earliest time the next attempt may happen
    pub not_before: Option<DateTime<Utc>>,
}

impl QueuedNotification {
    pub fn new(notification: Notification, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification,
            attempts: 0,
            rate_limits: 0,
            queued_at: now,
            not_before: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |t| now >= t)
    }
}

/// Persisted queue of undelivered notifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outbox {
    items: VecDeque<QueuedNotification>,
}

impl Outbox {
    /// Queue a notification behind everything already waiting
    pub fn enqueue(&mut self, notification: Notification, now: DateTime<Utc>) {
        self.items.push_back(QueuedNotification::new(notification, now));
    }

    /// Whether anything with this ordering key is waiting
    pub fn has_key(&self, key: &str) -> bool {
        self.items.iter().any(|i| i.notification.key() == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedNotification> {
        self.items.iter()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut QueuedNotification> {
        self.items.get_mut(index)
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<QueuedNotification> {
        self.items.remove(index)
    }
}
