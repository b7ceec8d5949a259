//! In-memory price series for tracked markets

use super::{join_histories, PricePoint, PriceSeries};
use crate::error::PipelineError;
use crate::market::{Market, PriceHistory};
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{DateTime, Duration, Utc};
use futures_util::{stream, StreamExt};
use std::collections::HashMap;
use std::time::Instant;

/// Price refresh settings
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// History requested on every refresh, ending now
    pub window: Duration,
    /// Markets fetched at once
    pub max_concurrent: usize,
    /// Budget for both token fetches of one market
    pub fetch_timeout: std::time::Duration,
    /// Samples older than this are dropped
    pub retention: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            window: Duration::days(1),
            max_concurrent: 8,
            fetch_timeout: std::time::Duration::from_secs(15),
            retention: Duration::days(8),
        }
    }
}

/// Outcome of one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Markets whose fetch succeeded
    pub updated: usize,
    /// Markets skipped this tick after a failed or slow fetch
    pub skipped: usize,
    /// New samples appended across all series
    pub appended: usize,
}

/// Price series keyed by condition id
#[derive(Debug, Default)]
pub struct PriceSeriesStore {
    config: RefreshConfig,
    series: HashMap<String, PriceSeries>,
}

impl PriceSeriesStore {
    pub fn new(config: RefreshConfig) -> Self {
        Self {
            config,
            series: HashMap::new(),
        }
    }

    /// Fetch recent history for `markets` and fold it into their series
    ///
    /// Fetches run concurrently up to the configured limit; results are
    /// merged one at a time so each series has a single writer. A market
    /// whose fetch fails keeps its previous series and is retried next tick.
    pub async fn refresh<P: PriceHistory>(
        &mut self,
        source: &P,
        markets: &[Market],
        now: DateTime<Utc>,
    ) -> RefreshReport {
        let start = Instant::now();
        let from = now - self.config.window;
        let timeout = self.config.fetch_timeout;
        let cutoff = now - self.config.retention;

        let mut results = stream::iter(markets)
            .map(move |market| async move {
                let fetched = fetch_market(source, market, from, now, timeout).await;
                (market.condition_id.as_str(), fetched)
            })
            .buffer_unordered(self.config.max_concurrent.max(1));

        let mut report = RefreshReport::default();
        while let Some((condition_id, fetched)) = results.next().await {
            match fetched {
                Ok(points) => {
                    report.appended += self.append(condition_id, &points, cutoff);
                    report.updated += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        condition_id,
                        error = %e,
                        "Price fetch failed, skipping market this tick"
                    );
                    report.skipped += 1;
                }
            }
        }

        telemetry::record_latency(LatencyMetric::PriceRefresh, start.elapsed());
        telemetry::increment(CounterMetric::PriceFetchesSkipped, report.skipped as u64);
        telemetry::set_gauge(GaugeMetric::PriceSeries, self.series.len() as f64);

        tracing::debug!(
            updated = report.updated,
            skipped = report.skipped,
            appended = report.appended,
            "Price refresh complete"
        );
        report
    }

    /// Append samples to a market's series and drop those before `cutoff`
    pub fn append(
        &mut self,
        condition_id: &str,
        points: &[PricePoint],
        cutoff: DateTime<Utc>,
    ) -> usize {
        let series = self.series.entry(condition_id.to_string()).or_default();
        let appended = series.append(points);
        series.prune_before(cutoff);
        appended
    }

    pub fn series(&self, condition_id: &str) -> Option<&PriceSeries> {
        self.series.get(condition_id)
    }

    pub fn latest(&self, condition_id: &str) -> Option<&PricePoint> {
        self.series.get(condition_id)?.latest()
    }

    pub fn remove(&mut self, condition_id: &str) -> Option<PriceSeries> {
        self.series.remove(condition_id)
    }

    /// Keep only the series for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.series.retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Fetch both token histories for one market within `timeout`
async fn fetch_market<P: PriceHistory>(
    source: &P,
    market: &Market,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    timeout: std::time::Duration,
) -> Result<Vec<PricePoint>, PipelineError> {
    let both = async {
        tokio::try_join!(
            source.fetch_history(&market.yes_token_id, from, to),
            source.fetch_history(&market.no_token_id, from, to)
        )
    };

    let (yes, no) = tokio::time::timeout(timeout, both).await.map_err(|_| {
        PipelineError::TransientNetwork(format!("Price fetch timed out after {:?}", timeout))
    })??;

    Ok(join_histories(&yes, &no))
}
