//! Run command implementation

use crate::config::{Config, NotifyMode};
use crate::detector::ChangeDetector;
use crate::discovery::{Crawler, CrawlerConfig};
use crate::market::{ClobClient, ClobConfig, TrackingFilter};
use crate::notify::{
    DispatchConfig, Dispatcher, LogNotifier, Notifier, TelegramConfig, TelegramNotifier,
};
use crate::prices::{PriceSeriesStore, RefreshConfig};
use crate::scheduler::{Components, Scheduler, SchedulerConfig};
use crate::state::StateStore;
use anyhow::Context;
use clap::Args;
use std::time::Duration;

/// Environment variable holding the bot token
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
/// Environment variable holding the chat id when the config has none
pub const CHAT_ID_ENV: &str = "TELEGRAM_CHAT_ID";

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Start with a full pass from the first listing page
    #[arg(long)]
    pub rescan: bool,

    /// Log notifications instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = StateStore::new(&config.state.path);
        let state = store
            .load()
            .with_context(|| format!("Failed to load state from {:?}", store.path()))?;

        let clob = ClobClient::with_config(ClobConfig {
            base_url: config.venue.clob_url.clone(),
            timeout: Duration::from_secs(config.venue.request_timeout_secs),
            fidelity_minutes: config.detection.fidelity_minutes,
        })?;

        let crawler = Crawler::new(
            clob.clone(),
            TrackingFilter::new(&config.tracking),
            CrawlerConfig {
                announce_initial: config.discovery.announce_initial,
            },
        );
        let detector =
            ChangeDetector::new(config.buckets()?).with_overrides(crawler.filter().price_deltas());

        let prices = PriceSeriesStore::new(RefreshConfig {
            window: chrono::Duration::seconds(config.detection.history_window_secs as i64),
            max_concurrent: config.detection.max_concurrent_fetches,
            fetch_timeout: Duration::from_secs(config.detection.fetch_timeout_secs),
            retention: chrono::Duration::seconds(config.detection.retention_secs as i64),
        });

        let dispatcher = Dispatcher::new(
            self.notifier(config)?,
            DispatchConfig {
                max_attempts: config.notify.max_attempts,
                max_rate_limits: config.notify.max_rate_limits,
                initial_backoff: chrono::Duration::seconds(
                    config.notify.initial_backoff_secs as i64,
                ),
                max_backoff: chrono::Duration::seconds(config.notify.max_backoff_secs as i64),
            },
        );

        let scheduler_config = SchedulerConfig {
            discovery_interval: Duration::from_secs(config.discovery.interval_secs),
            detection_interval: Duration::from_secs(config.detection.interval_secs),
            dispatch_interval: Duration::from_secs(config.notify.poll_interval_secs.max(1)),
            full_rescan_every: config.discovery.full_rescan_every,
            rescan_on_start: self.rescan,
        };

        tracing::info!(
            clob_url = %clob.base_url(),
            state_path = ?store.path(),
            buckets = ?config.detection.buckets.keys().collect::<Vec<_>>(),
            dry_run = self.dry_run,
            rescan = self.rescan,
            "Starting poly-notify"
        );

        let mut scheduler = Scheduler::new(
            scheduler_config,
            store,
            state,
            Components {
                crawler,
                history: clob,
                prices,
                detector,
                dispatcher,
            },
        );
        scheduler.run(shutdown_signal()).await?;
        Ok(())
    }

    fn notifier(&self, config: &Config) -> anyhow::Result<Box<dyn Notifier>> {
        if self.dry_run || config.notify.mode == NotifyMode::Log {
            tracing::info!("Notifications will be logged, not sent");
            return Ok(Box::new(LogNotifier));
        }

        let token = std::env::var(TOKEN_ENV)
            .with_context(|| format!("{} must be set to send Telegram messages", TOKEN_ENV))?;
        let chat_id = match &config.notify.chat_id {
            Some(id) => id.clone(),
            None => std::env::var(CHAT_ID_ENV).with_context(|| {
                format!("notify.chat_id or {} must be set", CHAT_ID_ENV)
            })?,
        };

        let notifier = TelegramNotifier::new(TelegramConfig {
            base_url: config.notify.telegram_url.clone(),
            token,
            chat_id,
            timeout: Duration::from_secs(config.notify.request_timeout_secs),
        })?;
        Ok(Box::new(notifier))
    }
}

/// Resolves on ctrl-c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
