//! poly-notify: Polymarket new-market and price-move notifier
//!
//! This library provides the core components for:
//! - Resumable market discovery over the CLOB listing
//! - Tag, keyword and explicit market tracking
//! - Per-market yes/no price series from price history
//! - Multi-horizon change detection with per-bucket watermarks
//! - Rate-limit aware Telegram delivery through a persisted outbox
//! - Crash-safe JSON state
//! - Logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod detector;
pub mod discovery;
pub mod error;
pub mod market;
pub mod notify;
pub mod prices;
pub mod scheduler;
pub mod state;
pub mod telemetry;
