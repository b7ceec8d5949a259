//! Resumable listing crawler
//!
//! Each page is applied to a staged copy of the state, persisted, and only
//! then committed in memory. A failed fetch or a failed write leaves both the
//! file and the in-memory state at the last committed page.

use super::DiscoveryReport;
use crate::error::PipelineError;
use crate::market::{is_terminal_cursor, Market, MarketListing, MarketPage, TrackingFilter};
use crate::notify::Notification;
use crate::state::{Cursor, PersistedState, SeenMarket, StateStore};
use crate::telemetry::{
    increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use chrono::{DateTime, Utc};
use std::time::Instant;

/// A market missing from this many consecutive full passes is closed
const ABSENT_PASSES: u64 = 2;

/// Crawler settings
#[derive(Debug, Clone, Default)]
pub struct CrawlerConfig {
    /// Queue new-market notifications before the first full pass completes
    pub announce_initial: bool,
}

/// Paginates the listing and reconciles it against the seen set
pub struct Crawler<L: MarketListing> {
    listing: L,
    filter: TrackingFilter,
    config: CrawlerConfig,
}

/// What one page changed
#[derive(Debug, Default)]
struct PageOutcome {
    new: Vec<Market>,
    closed: Vec<Market>,
    untracked_new: usize,
}

impl<L: MarketListing> Crawler<L> {
    pub fn new(listing: L, filter: TrackingFilter, config: CrawlerConfig) -> Self {
        Self {
            listing,
            filter,
            config,
        }
    }

    pub fn filter(&self) -> &TrackingFilter {
        &self.filter
    }

    /// Run one listing pass
    ///
    /// Resumes from the persisted cursor, or starts a full pass from the
    /// first page when there is none or `force_full` is set. A full pass that
    /// was interrupted is always finished first, so every pass number that
    /// markets are stamped with belongs to a pass that read every page.
    pub async fn discover(
        &self,
        state: &mut PersistedState,
        store: &StateStore,
        force_full: bool,
        now: DateTime<Utc>,
    ) -> Result<DiscoveryReport, PipelineError> {
        let (mut cursor, pass) = match &state.cursor {
            Some(cursor) if !force_full || cursor.full => {
                if force_full {
                    tracing::info!(
                        cursor = %cursor.token,
                        "Full pass already in progress, resuming it"
                    );
                }
                (cursor.clone(), state.full_pass)
            }
            _ => (Cursor::origin(state.next_sequence()), state.full_pass + 1),
        };
        let start = Instant::now();

        tracing::info!(
            cursor = %cursor.token,
            sequence = cursor.sequence,
            full = cursor.full,
            pass,
            "Starting discovery pass"
        );

        let mut report = DiscoveryReport::default();

        loop {
            let page = self.listing.fetch_page(&cursor.token).await.map_err(|e| {
                tracing::warn!(
                    error = %e,
                    cursor = %cursor.token,
                    sequence = cursor.sequence,
                    "Page fetch failed, aborting pass"
                );
                e
            })?;

            let next_token = page
                .next_cursor
                .clone()
                .filter(|next| !is_terminal_cursor(Some(next)) && *next != cursor.token);
            let finished = next_token.is_none();

            let mut staged = state.clone();
            staged.full_pass = pass;
            let mut outcome = self.apply_page(&mut staged, &page, pass, now);

            let next_cursor = match next_token {
                Some(token) => cursor.advance(token),
                None => cursor.settle(),
            };
            staged.cursor = Some(next_cursor.clone());

            if finished && cursor.full {
                self.sweep_absent(&mut staged, pass, now, &mut outcome);
                staged.bootstrapped = true;
            }

            store.save(&staged)?;
            *state = staged;

            tracing::debug!(
                sequence = cursor.sequence,
                markets = page.markets.len(),
                skipped = page.skipped,
                new = outcome.new.len(),
                closed = outcome.closed.len(),
                "Processed market page"
            );

            report.pages += 1;
            report.skipped += page.skipped;
            report.untracked_new += outcome.untracked_new;
            report.new.extend(outcome.new);
            report.closed.extend(outcome.closed);

            if finished {
                report.completed_full_pass = cursor.full;
                break;
            }
            cursor = next_cursor;
        }

        let tracked = state.tracked.len();
        tracing::info!(
            pages = report.pages,
            new_tracked = report.new.len(),
            new_untracked = report.untracked_new,
            closed = report.closed.len(),
            known_markets = state.seen.len(),
            tracked_markets = tracked,
            cursor_sequence = state.cursor.as_ref().map_or(0, |c| c.sequence),
            "Discovery pass complete"
        );
        record_latency(LatencyMetric::DiscoveryPass, start.elapsed());
        set_gauge(GaugeMetric::KnownMarkets, state.seen.len() as f64);
        set_gauge(GaugeMetric::TrackedMarkets, tracked as f64);
        increment(CounterMetric::MarketsDiscovered, report.new.len() as u64);
        increment(CounterMetric::MarketsClosed, report.closed.len() as u64);

        Ok(report)
    }

    /// Classify every market on a page against the staged state
    fn apply_page(
        &self,
        staged: &mut PersistedState,
        page: &MarketPage,
        pass: u64,
        now: DateTime<Utc>,
    ) -> PageOutcome {
        let mut outcome = PageOutcome::default();
        let announce = staged.bootstrapped || self.config.announce_initial;

        for market in &page.markets {
            let id = &market.condition_id;

            if let Some(seen) = staged.seen.get_mut(id) {
                if !market.is_resolved() {
                    seen.last_seen_pass = pass;
                    if seen.tracked {
                        staged.tracked.insert(id.clone(), market.clone());
                    }
                } else if staged.forget(id).is_some() {
                    tracing::info!(condition_id = %id, "Tracked market closed");
                    staged
                        .outbox
                        .enqueue(Notification::MarketClosed(market.clone()), now);
                    outcome.closed.push(market.clone());
                }
                continue;
            }

            if !market.is_live() {
                continue;
            }

            let tracked = self.filter.matches(market, now);
            staged.seen.insert(
                id.clone(),
                SeenMarket {
                    tracked,
                    last_seen_pass: pass,
                    first_seen: now,
                },
            );

            if !tracked {
                outcome.untracked_new += 1;
                continue;
            }

            tracing::info!(condition_id = %id, question = %market.question, "Market added");
            staged.tracked.insert(id.clone(), market.clone());
            if announce {
                staged
                    .outbox
                    .enqueue(Notification::NewMarket(market.clone()), now);
            }
            outcome.new.push(market.clone());
        }

        outcome
    }

    /// Prune markets the last two full passes did not list
    fn sweep_absent(
        &self,
        staged: &mut PersistedState,
        pass: u64,
        now: DateTime<Utc>,
        outcome: &mut PageOutcome,
    ) {
        let absent: Vec<String> = staged
            .seen
            .iter()
            .filter(|(_, seen)| seen.last_seen_pass + ABSENT_PASSES <= pass)
            .map(|(id, _)| id.clone())
            .collect();

        let mut pruned = 0usize;
        for id in absent {
            pruned += 1;
            if let Some(market) = staged.forget(&id) {
                tracing::info!(condition_id = %id, "Tracked market vanished from listing");
                staged
                    .outbox
                    .enqueue(Notification::MarketClosed(market.clone()), now);
                outcome.closed.push(market);
            }
        }

        if pruned > 0 {
            tracing::info!(pruned, pass, "Pruned markets absent from listing");
        }
    }
}
