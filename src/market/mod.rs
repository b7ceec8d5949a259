//! Market discovery module
//!
//! Venue-facing types and the two endpoints the pipeline consumes: the
//! cursor-paginated market listing and the per-token price history.

mod clob;
mod filter;

pub use clob::{ClobClient, ClobConfig, CLOB_API_URL};
pub use filter::TrackingFilter;

use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cursor that starts a listing pass from the first page
pub const ORIGIN_CURSOR: &str = "MA==";

/// Cursor the venue returns after the last page
pub const END_CURSOR: &str = "LTE=";

/// Whether a `next_cursor` value ends the pass
pub fn is_terminal_cursor(cursor: Option<&str>) -> bool {
    match cursor {
        None => true,
        Some(c) => c.is_empty() || c == END_CURSOR,
    }
}

/// A binary prediction market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Unique condition identifier
    pub condition_id: String,
    /// Market question
    pub question: String,
    /// Yes token identifier
    pub yes_token_id: String,
    /// No token identifier
    pub no_token_id: String,
    /// Outcome label of the yes token
    pub yes_outcome: String,
    /// Outcome label of the no token
    pub no_outcome: String,
    /// Last listed yes price
    pub yes_price: Option<Decimal>,
    /// Last listed no price
    pub no_price: Option<Decimal>,
    /// Venue tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Scheduled close time
    pub close_time: Option<DateTime<Utc>>,
    /// Traded volume in USD, when the venue reports it
    pub volume: Option<Decimal>,
    pub active: bool,
    pub closed: bool,
    pub accepting_orders: bool,
}

impl Market {
    /// Open for trading and not resolved
    pub fn is_live(&self) -> bool {
        self.active && !self.closed && self.accepting_orders
    }

    /// Closed or deactivated by the venue; a market that only stopped
    /// accepting orders is paused, not resolved
    pub fn is_resolved(&self) -> bool {
        self.closed || !self.active
    }
}

/// One page of the market listing
#[derive(Debug, Clone, Default)]
pub struct MarketPage {
    /// Markets that decoded cleanly
    pub markets: Vec<Market>,
    /// Records on the page that were malformed and skipped
    pub skipped: usize,
    /// Cursor for the following page
    pub next_cursor: Option<String>,
}

/// A single (timestamp, price) sample for one token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// Paginated market listing
#[async_trait]
pub trait MarketListing: Send + Sync {
    /// Fetch the page at `cursor`
    async fn fetch_page(&self, cursor: &str) -> Result<MarketPage, PipelineError>;
}

/// Per-token price history
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Fetch samples for `token_id` between `start` and `end`
    async fn fetch_history(
        &self,
        token_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoryPoint>, PipelineError>;
}
