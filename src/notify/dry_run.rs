//! Log-only notifier for dry runs

use super::Notifier;
use crate::error::PipelineError;
use async_trait::async_trait;

/// Writes every message to the log instead of a provider
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, text: &str) -> Result<(), PipelineError> {
        tracing::info!(text, "Notification");
        Ok(())
    }
}
