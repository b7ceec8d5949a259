//! Notification module
//!
//! Renders notifications to text and delivers them through a messaging
//! provider, keeping anything undelivered in the persisted outbox.

mod dispatcher;
mod dry_run;
mod format;
mod telegram;
mod types;

pub use dispatcher::{DispatchConfig, DispatchStats, Dispatcher, PollReport};
pub use dry_run::LogNotifier;
pub use format::render;
pub use telegram::{TelegramConfig, TelegramNotifier, TELEGRAM_API_URL};
pub use types::{Notification, Outbox, QueuedNotification};

use crate::error::PipelineError;
use async_trait::async_trait;

/// A messaging provider
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one plain-text message
    async fn send_text(&self, text: &str) -> Result<(), PipelineError>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Box<N> {
    async fn send_text(&self, text: &str) -> Result<(), PipelineError> {
        (**self).send_text(text).await
    }
}
