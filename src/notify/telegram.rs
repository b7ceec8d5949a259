//! Telegram Bot API notifier

use super::Notifier;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Telegram Bot API base URL
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Configuration for the Telegram notifier
#[derive(Clone)]
pub struct TelegramConfig {
    pub base_url: String,
    pub token: String,
    pub chat_id: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Sends messages to one chat through a bot
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> anyhow::Result<Self> {
        if config.token.is_empty() {
            anyhow::bail!("Telegram bot token is empty");
        }
        if config.chat_id.is_empty() {
            anyhow::bail!("Telegram chat id is empty");
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { config, client })
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, text: &str) -> Result<(), PipelineError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.base_url, self.config.token
        );

        // The URL carries the bot token, keep it out of error messages
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.config.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await
            .map_err(|e| PipelineError::from(e.without_url()))?;

        let status = response.status();
        let header_retry = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::from(e.without_url()))?;

        check_response(status, header_retry, &body)
    }
}

/// Map a sendMessage response onto the pipeline taxonomy
fn check_response(
    status: StatusCode,
    header_retry: Option<u64>,
    body: &str,
) -> Result<(), PipelineError> {
    let parsed: ApiResponse = serde_json::from_str(body).unwrap_or_default();

    if status.is_success() {
        if parsed.ok {
            return Ok(());
        }
        return Err(PipelineError::MalformedResponse(format!(
            "Telegram returned {} without ok: {}",
            status, body
        )));
    }

    let description = parsed
        .description
        .clone()
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parsed
            .parameters
            .and_then(|p| p.retry_after)
            .or(header_retry)
            .unwrap_or(1);
        return Err(PipelineError::RateLimited(Duration::from_secs(retry_after)));
    }

    if status.is_server_error() {
        Err(PipelineError::TransientNetwork(format!(
            "Telegram API error: {} - {}",
            status, description
        )))
    } else {
        Err(PipelineError::Rejected(format!(
            "Telegram API error: {} - {}",
            status, description
        )))
    }
}
