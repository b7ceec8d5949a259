//! Multi-horizon price change detector
//!
//! Each bucket keeps its own watermark per market. A bucket is only evaluated
//! once its horizon has elapsed since the previous evaluation, so a "1d"
//! bucket is checked once a day while "1m" is checked every tick.

use super::types::{AlertEvent, Bucket, Direction, Watermark};
use crate::market::Market;
use crate::prices::{PricePoint, PriceSeries, PriceSeriesStore};
use crate::state::PersistedState;
use crate::telemetry::{self, CounterMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// Detects dual-token price moves across configured buckets
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    /// Buckets, shortest horizon first
    buckets: Vec<Bucket>,

    /// Per-market thresholds replacing every bucket threshold
    overrides: HashMap<String, Decimal>,

    /// When each bucket was last evaluated
    last_evaluated: HashMap<String, DateTime<Utc>>,
}

impl ChangeDetector {
    pub fn new(buckets: Vec<Bucket>) -> Self {
        Self {
            buckets,
            overrides: HashMap::new(),
            last_evaluated: HashMap::new(),
        }
    }

    /// Use `overrides` (condition id to threshold) instead of bucket thresholds
    pub fn with_overrides(mut self, overrides: HashMap<String, Decimal>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Buckets whose horizon has elapsed since their last evaluation
    pub fn due_buckets(&self, now: DateTime<Utc>) -> Vec<Bucket> {
        self.buckets
            .iter()
            .filter(|b| {
                self.last_evaluated
                    .get(&b.name)
                    .map_or(true, |last| now - *last >= b.duration)
            })
            .cloned()
            .collect()
    }

    /// Record that `due` were evaluated at `now`
    ///
    /// Kept separate from evaluation so the caller can persist the resulting
    /// watermarks first; a failed save leaves the buckets due.
    pub fn mark_evaluated(&mut self, due: &[Bucket], now: DateTime<Utc>) {
        for bucket in due {
            self.last_evaluated.insert(bucket.name.clone(), now);
        }
    }

    /// Evaluate every due bucket and mark them evaluated
    pub fn evaluate(
        &mut self,
        state: &mut PersistedState,
        prices: &PriceSeriesStore,
        markets: &[Market],
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let due = self.due_buckets(now);
        let alerts = self.evaluate_buckets(&due, state, prices, markets, now);
        self.mark_evaluated(&due, now);
        alerts
    }

    /// Evaluate `due` buckets for every market, updating watermarks on alert
    pub fn evaluate_buckets(
        &self,
        due: &[Bucket],
        state: &mut PersistedState,
        prices: &PriceSeriesStore,
        markets: &[Market],
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();
        if due.is_empty() {
            return alerts;
        }

        for market in markets {
            let Some(series) = prices.series(&market.condition_id) else {
                continue;
            };
            let Some(latest) = series.latest().copied() else {
                continue;
            };
            let threshold_override = self.overrides.get(&market.condition_id).copied();

            for bucket in due {
                let (old_yes, old_no) = reference_price(state, series, market, bucket, now);
                let threshold = threshold_override.unwrap_or(bucket.threshold);

                let Some(direction) =
                    classify_move(old_yes, old_no, latest.yes, latest.no, threshold)
                else {
                    continue;
                };

                tracing::info!(
                    condition_id = %market.condition_id,
                    bucket = %bucket.name,
                    old_yes = %old_yes,
                    new_yes = %latest.yes,
                    old_no = %old_no,
                    new_no = %latest.no,
                    %direction,
                    "Price move detected"
                );

                state.set_watermark(&market.condition_id, &bucket.name, watermark_at(&latest));
                alerts.push(AlertEvent {
                    condition_id: market.condition_id.clone(),
                    question: market.question.clone(),
                    bucket: bucket.name.clone(),
                    old_yes,
                    old_no,
                    new_yes: latest.yes,
                    new_no: latest.no,
                    direction,
                    observed_at: latest.timestamp,
                });
            }
        }

        telemetry::increment(CounterMetric::AlertsFired, alerts.len() as u64);
        alerts
    }

    /// Drop watermarks for untracked markets and unconfigured buckets
    ///
    /// Returns how many watermarks were removed.
    pub fn prune_watermarks(&self, state: &mut PersistedState) -> usize {
        let names: HashSet<&str> = self.buckets.iter().map(|b| b.name.as_str()).collect();
        let tracked = &state.tracked;
        let mut removed = 0;

        state.watermarks.retain(|id, per_bucket| {
            if !tracked.contains_key(id) {
                removed += per_bucket.len();
                return false;
            }
            let before = per_bucket.len();
            per_bucket.retain(|name, _| names.contains(name.as_str()));
            removed += before - per_bucket.len();
            !per_bucket.is_empty()
        });

        removed
    }
}

/// Direction of a move, if it qualifies for an alert
///
/// Both tokens must move by at least `threshold` and in strictly opposite
/// directions. The direction follows the yes token.
pub fn classify_move(
    old_yes: Decimal,
    old_no: Decimal,
    new_yes: Decimal,
    new_no: Decimal,
    threshold: Decimal,
) -> Option<Direction> {
    let yes_delta = new_yes - old_yes;
    let no_delta = new_no - old_no;

    if yes_delta.abs() < threshold || no_delta.abs() < threshold {
        return None;
    }
    if yes_delta.is_zero() || no_delta.is_zero() {
        return None;
    }
    if yes_delta.is_sign_positive() == no_delta.is_sign_positive() {
        return None;
    }

    if yes_delta.is_sign_positive() {
        Some(Direction::Up)
    } else {
        Some(Direction::Down)
    }
}

/// Price the latest sample is compared against for one bucket
///
/// A watermark set within the bucket horizon wins; otherwise the sample at
/// the start of the horizon, or the oldest sample for a short series.
fn reference_price(
    state: &PersistedState,
    series: &PriceSeries,
    market: &Market,
    bucket: &Bucket,
    now: DateTime<Utc>,
) -> (Decimal, Decimal) {
    let horizon_start = now - bucket.duration;

    if let Some(wm) = state.watermark(&market.condition_id, &bucket.name) {
        if wm.set_at >= horizon_start {
            return (wm.yes, wm.no);
        }
    }

    series
        .at_or_before(horizon_start)
        .or_else(|| series.first())
        .map_or((Decimal::ZERO, Decimal::ZERO), |p| (p.yes, p.no))
}

fn watermark_at(point: &PricePoint) -> Watermark {
    Watermark {
        yes: point.yes,
        no: point.no,
        set_at: point.timestamp,
    }
}
