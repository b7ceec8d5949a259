//! Configuration types for poly-notify

use crate::detector::Bucket;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub venue: VenueConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    pub detection: DetectionConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Venue API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VenueConfig {
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_clob_url() -> String {
    crate::market::CLOB_API_URL.to_string()
}
fn default_request_timeout() -> u64 {
    10
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            clob_url: default_clob_url(),
            request_timeout_secs: 10,
        }
    }
}

/// Market discovery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Seconds between discovery passes
    #[serde(default = "default_discovery_interval")]
    pub interval_secs: u64,

    /// Force a pass from the first page every N discovery ticks (0 = never)
    #[serde(default = "default_full_rescan_every")]
    pub full_rescan_every: u64,

    /// Announce markets found before the first full pass completes
    #[serde(default)]
    pub announce_initial: bool,
}

fn default_discovery_interval() -> u64 {
    120
}
fn default_full_rescan_every() -> u64 {
    30
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            full_rescan_every: 30,
            announce_initial: false,
        }
    }
}

/// Price change detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Seconds between detection ticks
    #[serde(default = "default_detection_interval")]
    pub interval_secs: u64,

    /// Width of the price history window requested on every refresh
    #[serde(default = "default_history_window")]
    pub history_window_secs: u64,

    /// Price history resolution in minutes
    #[serde(default = "default_fidelity")]
    pub fidelity_minutes: u32,

    /// Maximum concurrent price history fetches
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Per-market fetch timeout
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// How long samples are kept in memory
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Bucket name (e.g. "1m", "1h") to price delta threshold
    pub buckets: BTreeMap<String, Decimal>,
}

fn default_detection_interval() -> u64 {
    60
}
fn default_history_window() -> u64 {
    86_400
}
fn default_fidelity() -> u32 {
    1
}
fn default_max_concurrent_fetches() -> usize {
    8
}
fn default_fetch_timeout() -> u64 {
    15
}
fn default_retention() -> u64 {
    8 * 86_400
}

/// Which markets to watch
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Track markets carrying any of these venue tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Track markets whose question contains any of these (case-insensitive)
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Minimum traded volume for a market to be tracked
    pub volume_floor: Option<Decimal>,

    /// Ignore markets closing further out than this
    pub max_expiry_days: Option<u64>,

    /// Explicitly tracked markets with optional overrides
    #[serde(default)]
    pub markets: Vec<TrackedMarket>,
}

/// An explicitly tracked market
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackedMarket {
    pub condition_id: String,
    /// Replaces every bucket threshold for this market
    pub price_delta: Option<Decimal>,
    pub volume_floor: Option<Decimal>,
    pub max_expiry_days: Option<u64>,
}

/// Notification delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub mode: NotifyMode,

    #[serde(default = "default_telegram_url")]
    pub telegram_url: String,

    /// Chat to deliver to; falls back to `TELEGRAM_CHAT_ID`
    pub chat_id: Option<String>,

    /// Seconds between retry queue checks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Attempts before a notification is given up on
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Rate-limit responses before a notification is given up on
    #[serde(default = "default_max_rate_limits")]
    pub max_rate_limits: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Notification sink
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyMode {
    #[default]
    Telegram,
    /// Write notifications to the log only
    Log,
}

fn default_telegram_url() -> String {
    crate::notify::TELEGRAM_API_URL.to_string()
}
fn default_poll_interval() -> u64 {
    1
}
fn default_max_attempts() -> u32 {
    5
}
fn default_max_rate_limits() -> u32 {
    10
}
fn default_initial_backoff() -> u64 {
    5
}
fn default_max_backoff() -> u64 {
    300
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mode: NotifyMode::Telegram,
            telegram_url: default_telegram_url(),
            chat_id: None,
            poll_interval_secs: 1,
            max_attempts: 5,
            max_rate_limits: 10,
            initial_backoff_secs: 5,
            max_backoff_secs: 300,
            request_timeout_secs: 10,
        }
    }
}

/// Persisted state location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./data/state.json")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.detection.buckets.is_empty() {
            anyhow::bail!("At least one detection bucket must be configured");
        }
        self.buckets()?;
        if self.detection.max_concurrent_fetches == 0 {
            anyhow::bail!("detection.max_concurrent_fetches must be at least 1");
        }
        if self.notify.max_attempts == 0 || self.notify.max_rate_limits == 0 {
            anyhow::bail!("notify.max_attempts and notify.max_rate_limits must be at least 1");
        }
        if self.discovery.interval_secs == 0 || self.detection.interval_secs == 0 {
            anyhow::bail!("Scheduler intervals must be non-zero");
        }
        Ok(())
    }

    /// Configured buckets, shortest horizon first
    pub fn buckets(&self) -> anyhow::Result<Vec<Bucket>> {
        let mut buckets = self
            .detection
            .buckets
            .iter()
            .map(|(name, threshold)| {
                Bucket::parse(name, *threshold)
                    .ok_or_else(|| anyhow::anyhow!("Unknown bucket horizon: {}", name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        buckets.sort_by_key(|b| b.duration);
        Ok(buckets)
    }
}
