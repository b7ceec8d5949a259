//! Rate-limit aware notification dispatcher
//!
//! Delivery goes through the persisted [`Outbox`]. Items sharing an ordering
//! key are delivered in the order they were queued; a rate limit pauses the
//! whole provider until its retry-after has passed.
//!
//! Producers queue notifications and persist them first. The scheduler polls
//! right after any tick that queued something, which is the first delivery
//! attempt.

use super::format::render;
use super::types::{Outbox, QueuedNotification};
use super::Notifier;
use crate::error::PipelineError;
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::time::Instant;

/// Retry policy
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Failed attempts before an item is given up on
    pub max_attempts: u32,
    /// Rate-limit responses before an item is given up on
    pub max_rate_limits: u32,
    /// Delay after the first transient failure, doubled per attempt
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_rate_limits: 10,
            initial_backoff: Duration::seconds(5),
            max_backoff: Duration::minutes(5),
        }
    }
}

/// Lifetime delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    pub rate_limited: u64,
}

/// Outcome of one pass over the outbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub delivered: usize,
    /// Items left in the outbox
    pub deferred: usize,
    pub failed: usize,
    /// Attempts that failed and were rescheduled
    pub retried: usize,
}

impl PollReport {
    /// Whether the outbox was modified
    pub fn changed(&self) -> bool {
        self.delivered > 0 || self.failed > 0 || self.retried > 0
    }
}

enum Attempt {
    Delivered,
    Retry,
    GaveUp,
}

/// Delivers notifications through a [`Notifier`]
pub struct Dispatcher<N> {
    notifier: N,
    config: DispatchConfig,
    /// Provider-wide pause after a rate limit
    paused_until: Option<DateTime<Utc>>,
    stats: DispatchStats,
}

impl<N: Notifier> Dispatcher<N> {
    pub fn new(notifier: N, config: DispatchConfig) -> Self {
        Self {
            notifier,
            config,
            paused_until: None,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// At least one notification was given up on since startup
    pub fn is_degraded(&self) -> bool {
        self.stats.failed > 0
    }

    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|until| now < until)
    }

    /// Attempt every due item in the outbox
    pub async fn poll(&mut self, outbox: &mut Outbox, now: DateTime<Utc>) -> PollReport {
        let mut report = PollReport::default();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut index = 0;

        while let Some(item) = outbox.get_mut(index) {
            let key = item.notification.key();
            if blocked.contains(&key) || self.is_paused(now) || !item.is_due(now) {
                blocked.insert(key);
                report.deferred += 1;
                index += 1;
                continue;
            }

            match self.attempt(item, now).await {
                Attempt::Delivered => {
                    outbox.remove(index);
                    report.delivered += 1;
                }
                Attempt::GaveUp => {
                    outbox.remove(index);
                    report.failed += 1;
                }
                Attempt::Retry => {
                    blocked.insert(key);
                    report.retried += 1;
                    report.deferred += 1;
                    index += 1;
                }
            }
        }

        if report.changed() {
            tracing::debug!(
                delivered = report.delivered,
                failed = report.failed,
                deferred = report.deferred,
                "Outbox poll complete"
            );
        }
        report
    }

    async fn attempt(&mut self, item: &mut QueuedNotification, now: DateTime<Utc>) -> Attempt {
        let text = render(&item.notification);
        let start = Instant::now();
        let result = self.notifier.send_text(&text).await;
        telemetry::record_latency(LatencyMetric::Delivery, start.elapsed());

        match result {
            Ok(()) => {
                self.stats.delivered += 1;
                telemetry::increment(CounterMetric::NotificationsDelivered, 1);
                tracing::info!(
                    id = %item.id,
                    kind = item.notification.kind(),
                    condition_id = item.notification.condition_id(),
                    "Notification delivered"
                );
                Attempt::Delivered
            }
            Err(PipelineError::RateLimited(retry_after)) => {
                let wait = Duration::from_std(retry_after).unwrap_or(self.config.max_backoff);
                let until = now + wait;
                item.rate_limits += 1;
                item.not_before = Some(until);
                self.paused_until = Some(self.paused_until.map_or(until, |p| p.max(until)));
                self.stats.rate_limited += 1;
                telemetry::increment(CounterMetric::RateLimited, 1);
                if item.rate_limits >= self.config.max_rate_limits {
                    return self.give_up(item, &PipelineError::RateLimited(retry_after));
                }
                tracing::warn!(
                    id = %item.id,
                    rate_limits = item.rate_limits,
                    retry_after_secs = wait.num_seconds(),
                    "Provider rate limited, pausing delivery"
                );
                Attempt::Retry
            }
            Err(e) if e.is_retryable() && item.attempts + 1 < self.config.max_attempts => {
                item.attempts += 1;
                let delay = self.backoff(item.attempts);
                item.not_before = Some(now + delay);
                tracing::warn!(
                    id = %item.id,
                    attempts = item.attempts,
                    retry_in_secs = delay.num_seconds(),
                    error = %e,
                    "Notification delivery failed, will retry"
                );
                Attempt::Retry
            }
            Err(e) => {
                item.attempts += 1;
                self.give_up(item, &e)
            }
        }
    }

    fn give_up(&mut self, item: &QueuedNotification, error: &PipelineError) -> Attempt {
        self.stats.failed += 1;
        telemetry::increment(CounterMetric::NotificationsFailed, 1);
        tracing::error!(
            id = %item.id,
            kind = item.notification.kind(),
            condition_id = item.notification.condition_id(),
            attempts = item.attempts,
            rate_limits = item.rate_limits,
            error = %error,
            "Giving up on notification"
        );
        Attempt::GaveUp
    }

    /// Delay before the retry following failed attempt number `attempts`
    fn backoff(&self, attempts: u32) -> Duration {
        let mut delay = self.config.initial_backoff;
        for _ in 1..attempts {
            delay = delay * 2;
            if delay >= self.config.max_backoff {
                return self.config.max_backoff;
            }
        }
        delay.min(self.config.max_backoff)
    }
}
