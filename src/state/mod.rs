//! Persisted pipeline state
//!
//! Everything that must survive a restart lives in [`PersistedState`]: the
//! single listing cursor, the seen set, tracked market records, bucket
//! watermarks and the notification outbox. Components receive it by `&mut`
//! and the whole document is replaced atomically by [`StateStore`].

mod store;

pub use store::StateStore;

use crate::detector::Watermark;
use crate::market::{Market, ORIGIN_CURSOR};
use crate::notify::Outbox;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk format version
pub const STATE_VERSION: u32 = 1;

/// Position in the market listing
///
/// Only one cursor is ever kept; advancing replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Opaque venue token for the next page to fetch
    pub token: String,
    /// Monotonic across pages and passes
    pub sequence: u64,
    /// The pass holding this cursor started from the first page
    pub full: bool,
}

impl Cursor {
    /// Start of a full pass
    pub fn origin(sequence: u64) -> Self {
        Self {
            token: ORIGIN_CURSOR.to_string(),
            sequence,
            full: true,
        }
    }

    /// Move on to the page at `token`
    pub fn advance(&self, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            sequence: self.sequence + 1,
            full: self.full,
        }
    }

    /// End of pass: stay on the tail page so new listings are picked up next
    pub fn settle(&self) -> Self {
        Self {
            token: self.token.clone(),
            sequence: self.sequence + 1,
            full: false,
        }
    }
}

/// Seen set entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenMarket {
    /// Selected by the tracking filter when first seen
    pub tracked: bool,
    /// Full pass number during which the listing last showed this market
    pub last_seen_pass: u64,
    pub first_seen: DateTime<Utc>,
}

/// Durable pipeline state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub cursor: Option<Cursor>,
    /// Number of full passes started
    pub full_pass: u64,
    /// A full pass has completed at least once
    pub bootstrapped: bool,
    pub seen: BTreeMap<String, SeenMarket>,
    /// Records of tracked markets, keyed by condition id
    pub tracked: BTreeMap<String, Market>,
    /// condition id -> bucket name -> watermark
    pub watermarks: BTreeMap<String, BTreeMap<String, Watermark>>,
    pub outbox: Outbox,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            cursor: None,
            full_pass: 0,
            bootstrapped: false,
            seen: BTreeMap::new(),
            tracked: BTreeMap::new(),
            watermarks: BTreeMap::new(),
            outbox: Outbox::default(),
        }
    }
}

impl PersistedState {
    pub fn is_seen(&self, condition_id: &str) -> bool {
        self.seen.contains_key(condition_id)
    }

    pub fn watermark(&self, condition_id: &str, bucket: &str) -> Option<&Watermark> {
        self.watermarks.get(condition_id)?.get(bucket)
    }

    pub fn set_watermark(&mut self, condition_id: &str, bucket: &str, watermark: Watermark) {
        self.watermarks
            .entry(condition_id.to_string())
            .or_default()
            .insert(bucket.to_string(), watermark);
    }

    /// Prune a market from the seen set, tracked records and watermarks
    ///
    /// Returns the tracked record when the market was tracked.
    pub fn forget(&mut self, condition_id: &str) -> Option<Market> {
        self.seen.remove(condition_id);
        self.watermarks.remove(condition_id);
        self.tracked.remove(condition_id)
    }

    /// Sequence number the next fresh cursor should carry
    pub fn next_sequence(&self) -> u64 {
        self.cursor.as_ref().map_or(0, |c| c.sequence + 1)
    }
}
