//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One full discovery pass
    DiscoveryPass,
    /// Price history refresh for all tracked markets
    PriceRefresh,
    /// Single provider send call
    Delivery,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Markets in the seen set
    KnownMarkets,
    /// Markets selected for price tracking
    TrackedMarkets,
    /// Markets with an in-memory price series
    PriceSeries,
    /// Notifications waiting for delivery
    OutboxDepth,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    MarketsDiscovered,
    MarketsClosed,
    AlertsFired,
    PriceFetchesSkipped,
    NotificationsDelivered,
    NotificationsFailed,
    RateLimited,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::DiscoveryPass => "polynotify_discovery_pass_ms",
        LatencyMetric::PriceRefresh => "polynotify_price_refresh_ms",
        LatencyMetric::Delivery => "polynotify_delivery_ms",
    };

    metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::KnownMarkets => "polynotify_known_markets",
        GaugeMetric::TrackedMarkets => "polynotify_tracked_markets",
        GaugeMetric::PriceSeries => "polynotify_price_series",
        GaugeMetric::OutboxDepth => "polynotify_outbox_depth",
    };

    metrics::gauge!(metric_name).set(value);
}

/// Add to a counter
pub fn increment(metric: CounterMetric, count: u64) {
    if count == 0 {
        return;
    }
    let metric_name = match metric {
        CounterMetric::MarketsDiscovered => "polynotify_markets_discovered_total",
        CounterMetric::MarketsClosed => "polynotify_markets_closed_total",
        CounterMetric::AlertsFired => "polynotify_alerts_fired_total",
        CounterMetric::PriceFetchesSkipped => "polynotify_price_fetches_skipped_total",
        CounterMetric::NotificationsDelivered => "polynotify_notifications_delivered_total",
        CounterMetric::NotificationsFailed => "polynotify_notifications_failed_total",
        CounterMetric::RateLimited => "polynotify_rate_limited_total",
    };

    metrics::counter!(metric_name).increment(count);
}
