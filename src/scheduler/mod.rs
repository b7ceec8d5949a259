//! Pipeline scheduler
//!
//! One cooperative loop drives discovery, price detection and outbox
//! delivery on their own cadences. The loop owns the persisted state and
//! lends it to each component in turn, so no tick ever overlaps another.
//! A tick that queues notifications is followed by a dispatch in the same
//! loop iteration.

use crate::detector::{AlertEvent, ChangeDetector};
use crate::discovery::{Crawler, DiscoveryReport};
use crate::error::PipelineError;
use crate::market::{Market, MarketListing, PriceHistory};
use crate::notify::{Dispatcher, Notification, Notifier, PollReport};
use crate::prices::PriceSeriesStore;
use crate::state::{PersistedState, StateStore};
use crate::telemetry::{self, GaugeMetric};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Tick cadences
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub discovery_interval: Duration,
    pub detection_interval: Duration,
    pub dispatch_interval: Duration,
    /// Start a pass from the first page every N discovery ticks (0 = never)
    pub full_rescan_every: u64,
    /// Make the first discovery tick a full pass
    pub rescan_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(120),
            detection_interval: Duration::from_secs(60),
            dispatch_interval: Duration::from_secs(1),
            full_rescan_every: 30,
            rescan_on_start: false,
        }
    }
}

/// Components driven by the scheduler
pub struct Components<L: MarketListing, P: PriceHistory, N: Notifier> {
    pub crawler: Crawler<L>,
    pub history: P,
    pub prices: PriceSeriesStore,
    pub detector: ChangeDetector,
    pub dispatcher: Dispatcher<N>,
}

pub struct Scheduler<L: MarketListing, P: PriceHistory, N: Notifier> {
    config: SchedulerConfig,
    store: StateStore,
    state: PersistedState,
    crawler: Crawler<L>,
    history: P,
    prices: PriceSeriesStore,
    detector: ChangeDetector,
    dispatcher: Dispatcher<N>,
    discovery_ticks: u64,
    force_full: bool,
}

impl<L: MarketListing, P: PriceHistory, N: Notifier> Scheduler<L, P, N> {
    pub fn new(
        config: SchedulerConfig,
        store: StateStore,
        state: PersistedState,
        components: Components<L, P, N>,
    ) -> Self {
        let force_full = config.rescan_on_start;
        Self {
            config,
            store,
            state,
            crawler: components.crawler,
            history: components.history,
            prices: components.prices,
            detector: components.detector,
            dispatcher: components.dispatcher,
            discovery_ticks: 0,
            force_full,
        }
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn prices(&self) -> &PriceSeriesStore {
        &self.prices
    }

    pub fn dispatcher(&self) -> &Dispatcher<N> {
        &self.dispatcher
    }

    /// Run one discovery pass
    pub async fn run_discovery(&mut self) -> Result<DiscoveryReport, PipelineError> {
        self.discovery_ticks += 1;
        let every = self.config.full_rescan_every;
        let force = self.force_full || (every > 0 && self.discovery_ticks % every == 0);

        let result = self
            .crawler
            .discover(&mut self.state, &self.store, force, Utc::now())
            .await;

        // A full pass interrupted mid-way resumes from its persisted cursor
        if result.is_ok() || self.state.cursor.as_ref().is_some_and(|c| c.full) {
            self.force_full = false;
        } else if force {
            self.force_full = true;
        }

        let report = result?;
        for market in &report.closed {
            self.prices.remove(&market.condition_id);
        }
        Ok(report)
    }

    /// Refresh prices for tracked markets and queue alerts for due buckets
    pub async fn run_detection(&mut self) -> Result<Vec<AlertEvent>, PipelineError> {
        let tracked = &self.state.tracked;
        self.prices.retain(|id| tracked.contains_key(id));

        let markets: Vec<Market> = self.state.tracked.values().cloned().collect();
        if markets.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        self.prices.refresh(&self.history, &markets, now).await;

        let due = self.detector.due_buckets(now);
        let mut staged = self.state.clone();
        let pruned = self.detector.prune_watermarks(&mut staged);
        let alerts = self
            .detector
            .evaluate_buckets(&due, &mut staged, &self.prices, &markets, now);

        for alert in &alerts {
            staged
                .outbox
                .enqueue(Notification::PriceMove(alert.clone()), now);
        }

        if !alerts.is_empty() || pruned > 0 {
            self.store.save(&staged)?;
        }
        self.state = staged;
        self.detector.mark_evaluated(&due, now);

        if !alerts.is_empty() {
            tracing::info!(alerts = alerts.len(), "Queued price move alerts");
        }
        Ok(alerts)
    }

    /// Deliver whatever in the outbox is due
    pub async fn run_dispatch(&mut self) -> Result<PollReport, PipelineError> {
        let report = self
            .dispatcher
            .poll(&mut self.state.outbox, Utc::now())
            .await;
        telemetry::set_gauge(GaugeMetric::OutboxDepth, self.state.outbox.len() as f64);

        if report.changed() {
            self.store.save(&self.state)?;
        }
        Ok(report)
    }

    /// Write the current state to disk
    pub fn flush(&self) -> Result<(), PipelineError> {
        self.store.save(&self.state)
    }

    /// Run ticks until `shutdown` resolves, then flush the state
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let start = Instant::now();
        let mut next_discovery = start;
        let mut next_detection = start;
        let mut next_dispatch = start;

        tracing::info!(
            discovery_secs = self.config.discovery_interval.as_secs(),
            detection_secs = self.config.detection_interval.as_secs(),
            dispatch_secs = self.config.dispatch_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            let deadline = next_discovery.min(next_detection).min(next_dispatch);
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }

            let queued = self.state.outbox.len();

            if Instant::now() >= next_discovery {
                match self.run_discovery().await {
                    Ok(report) => tracing::info!(
                        pages = report.pages,
                        new = report.new.len(),
                        closed = report.closed.len(),
                        skipped = report.skipped,
                        full_pass = report.completed_full_pass,
                        "Discovery tick complete"
                    ),
                    Err(e) => log_tick_error("discovery", &e),
                }
                next_discovery = Instant::now() + self.config.discovery_interval;
            }

            if Instant::now() >= next_detection {
                if let Err(e) = self.run_detection().await {
                    log_tick_error("detection", &e);
                }
                next_detection = Instant::now() + self.config.detection_interval;
            }

            // Freshly queued notifications get their first attempt this tick
            if self.state.outbox.len() > queued || Instant::now() >= next_dispatch {
                if let Err(e) = self.run_dispatch().await {
                    log_tick_error("dispatch", &e);
                }
                next_dispatch = Instant::now() + self.config.dispatch_interval;
            }
        }

        self.flush()?;
        tracing::info!(
            outbox = self.state.outbox.len(),
            degraded = self.dispatcher.is_degraded(),
            "State flushed, scheduler stopped"
        );
        Ok(())
    }
}

fn log_tick_error(tick: &str, error: &PipelineError) {
    match error {
        PipelineError::Persistence(_) => {
            tracing::error!(tick, error = %error, "Tick failed, state not advanced")
        }
        _ => tracing::warn!(tick, error = %error, "Tick failed, will retry"),
    }
}
