//! Tracking filter
//!
//! Decides which discovered markets are watched for price moves. A market is
//! selected when it is listed explicitly, carries a configured tag, or its
//! question contains a configured keyword. Selected markets must then pass
//! the volume floor and expiry gates; gates only reject on values the venue
//! actually reported.

use super::Market;
use crate::config::{TrackedMarket, TrackingConfig};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Selects tracked markets from the listing
#[derive(Debug, Clone, Default)]
pub struct TrackingFilter {
    tags: Vec<String>,
    keywords: Vec<String>,
    volume_floor: Option<Decimal>,
    max_expiry: Option<Duration>,
    explicit: HashMap<String, TrackedMarket>,
}

impl TrackingFilter {
    /// Build a filter from the tracking section of the config
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            tags: config.tags.clone(),
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            volume_floor: config.volume_floor,
            max_expiry: config.max_expiry_days.map(days),
            explicit: config
                .markets
                .iter()
                .map(|m| (m.condition_id.clone(), m.clone()))
                .collect(),
        }
    }

    /// Whether `market` should be tracked at time `now`
    pub fn matches(&self, market: &Market, now: DateTime<Utc>) -> bool {
        let overrides = self.explicit.get(&market.condition_id);

        let selected = overrides.is_some()
            || market.tags.iter().any(|t| self.tags.contains(t))
            || self.matches_keyword(&market.question);
        if !selected {
            return false;
        }

        let floor = overrides
            .and_then(|o| o.volume_floor)
            .or(self.volume_floor);
        if let (Some(floor), Some(volume)) = (floor, market.volume) {
            if volume < floor {
                return false;
            }
        }

        let max_expiry = overrides
            .and_then(|o| o.max_expiry_days.map(days))
            .or(self.max_expiry);
        if let (Some(max_expiry), Some(close_time)) = (max_expiry, market.close_time) {
            if close_time - now > max_expiry {
                return false;
            }
        }

        true
    }

    /// Per-market price delta override
    pub fn price_delta(&self, condition_id: &str) -> Option<Decimal> {
        self.explicit.get(condition_id).and_then(|m| m.price_delta)
    }

    /// All per-market price delta overrides
    pub fn price_deltas(&self) -> HashMap<String, Decimal> {
        self.explicit
            .keys()
            .filter_map(|id| self.price_delta(id).map(|d| (id.clone(), d)))
            .collect()
    }

    fn matches_keyword(&self, question: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let question = question.to_lowercase();
        self.keywords.iter().any(|k| question.contains(k.as_str()))
    }
}

fn days(n: u64) -> Duration {
    Duration::days(n as i64)
}
