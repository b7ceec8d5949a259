//! Price series module
//!
//! Per-market yes/no price history built from the venue's per-token
//! history endpoint.

mod store;

pub use store::{PriceSeriesStore, RefreshConfig, RefreshReport};

use crate::market::HistoryPoint;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// A joint yes/no sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub yes: Decimal,
    pub no: Decimal,
}

/// Append-only series with strictly increasing timestamps
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    points: VecDeque<PricePoint>,
}

impl PriceSeries {
    /// Append the points newer than the current last point
    ///
    /// Input must be sorted by timestamp. Returns how many were appended.
    pub fn append(&mut self, points: &[PricePoint]) -> usize {
        let mut appended = 0;
        for point in points {
            if self
                .points
                .back()
                .map_or(true, |last| point.timestamp > last.timestamp)
            {
                self.points.push_back(*point);
                appended += 1;
            }
        }
        appended
    }

    /// Drop points older than `cutoff`, always keeping the latest one
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) {
        while self.points.len() > 1 {
            match self.points.front() {
                Some(p) if p.timestamp < cutoff => {
                    self.points.pop_front();
                }
                _ => break,
            }
        }
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.front()
    }

    /// Last point at or before `ts`
    pub fn at_or_before(&self, ts: DateTime<Utc>) -> Option<&PricePoint> {
        let idx = self.points.partition_point(|p| p.timestamp <= ts);
        if idx == 0 {
            None
        } else {
            self.points.get(idx - 1)
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Join yes and no token histories into joint points
///
/// Walks the union of timestamps carrying the last seen price of each side
/// forward; points are emitted once both sides have a price.
pub fn join_histories(yes: &[HistoryPoint], no: &[HistoryPoint]) -> Vec<PricePoint> {
    let mut yes = sorted(yes);
    let mut no = sorted(no);
    yes.dedup_by_key(|p| p.timestamp);
    no.dedup_by_key(|p| p.timestamp);

    let mut out = Vec::with_capacity(yes.len().max(no.len()));
    let (mut i, mut j) = (0, 0);
    let mut last_yes: Option<Decimal> = None;
    let mut last_no: Option<Decimal> = None;

    while i < yes.len() || j < no.len() {
        let ts = match (yes.get(i), no.get(j)) {
            (Some(y), Some(n)) => y.timestamp.min(n.timestamp),
            (Some(y), None) => y.timestamp,
            (None, Some(n)) => n.timestamp,
            (None, None) => break,
        };

        if let Some(y) = yes.get(i).filter(|y| y.timestamp == ts) {
            last_yes = Some(y.price);
            i += 1;
        }
        if let Some(n) = no.get(j).filter(|n| n.timestamp == ts) {
            last_no = Some(n.price);
            j += 1;
        }

        if let (Some(yes), Some(no)) = (last_yes, last_no) {
            out.push(PricePoint {
                timestamp: ts,
                yes,
                no,
            });
        }
    }

    out
}

fn sorted(points: &[HistoryPoint]) -> Vec<HistoryPoint> {
    let mut v = points.to_vec();
    v.sort_by_key(|p| p.timestamp);
    v
}
