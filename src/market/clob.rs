//! CLOB API client for market listing and price history
//!
//! The listing endpoint pages through every market the venue knows about
//! using an opaque `next_cursor`. Records are decoded one by one so a single
//! malformed market does not cost the whole page.

use super::{HistoryPoint, Market, MarketListing, MarketPage, PriceHistory};
use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// CLOB API base URL
pub const CLOB_API_URL: &str = "https://clob.polymarket.com";

/// Configuration for the CLOB client
#[derive(Debug, Clone)]
pub struct ClobConfig {
    /// Base URL for the CLOB API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Price history resolution in minutes
    pub fidelity_minutes: u32,
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            base_url: CLOB_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            fidelity_minutes: 1,
        }
    }
}

/// Client for Polymarket's CLOB REST API
#[derive(Clone)]
pub struct ClobClient {
    config: ClobConfig,
    client: Client,
}

impl ClobClient {
    /// Create a new client with default configuration
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(ClobConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClobConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }
}

#[async_trait]
impl MarketListing for ClobClient {
    async fn fetch_page(&self, cursor: &str) -> Result<MarketPage, PipelineError> {
        let url = format!("{}/markets", self.config.base_url);

        tracing::debug!(url = %url, cursor, "Fetching market page");

        let response = self
            .client
            .get(&url)
            .query(&[("next_cursor", cursor)])
            .send()
            .await?;
        let response = check_status(response).await?;

        let raw: RawPage = response.json().await?;
        Ok(decode_page(raw))
    }
}

#[async_trait]
impl PriceHistory for ClobClient {
    async fn fetch_history(
        &self,
        token_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoryPoint>, PipelineError> {
        let url = format!("{}/prices-history", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("market", token_id.to_string()),
                ("startTs", start.timestamp().to_string()),
                ("endTs", end.timestamp().to_string()),
                ("fidelity", self.config.fidelity_minutes.to_string()),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;

        let raw: RawHistory = response.json().await?;
        decode_history(raw)
    }
}

/// Map a non-success HTTP status onto the pipeline taxonomy
async fn check_status(response: Response) -> Result<Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(PipelineError::RateLimited(Duration::from_secs(retry_after)));
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(PipelineError::TransientNetwork(format!(
            "CLOB API error: {} - {}",
            status, body
        )))
    } else {
        Err(PipelineError::Rejected(format!(
            "CLOB API error: {} - {}",
            status, body
        )))
    }
}

/// Listing page as returned by the venue, records still undecoded
#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    data: Vec<serde_json::Value>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClobMarket {
    condition_id: String,
    #[serde(default)]
    question: String,
    tokens: Vec<ClobToken>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    accepting_orders: bool,
    end_date_iso: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(default, alias = "volumeNum", alias = "volume_num")]
    volume: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ClobToken {
    token_id: String,
    #[serde(default)]
    outcome: String,
    price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    #[serde(default)]
    history: Vec<RawHistoryPoint>,
}

#[derive(Debug, Deserialize)]
struct RawHistoryPoint {
    t: i64,
    p: Decimal,
}

fn decode_page(raw: RawPage) -> MarketPage {
    let mut page = MarketPage {
        next_cursor: raw.next_cursor,
        ..Default::default()
    };

    for value in raw.data {
        match decode_market(value) {
            Ok(market) => page.markets.push(market),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed market record");
                page.skipped += 1;
            }
        }
    }

    page
}

fn decode_market(value: serde_json::Value) -> Result<Market, PipelineError> {
    let clob: ClobMarket = serde_json::from_value(value)
        .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;
    convert_to_market(clob)
}

/// Convert a CLOB record to our Market type
fn convert_to_market(clob: ClobMarket) -> Result<Market, PipelineError> {
    if clob.tokens.len() != 2 {
        return Err(PipelineError::MalformedResponse(format!(
            "Expected 2 tokens for {}, got {}",
            clob.condition_id,
            clob.tokens.len()
        )));
    }

    // Outcome labels decide the sides when present, otherwise first token is YES
    let mut tokens = clob.tokens;
    if tokens[1].outcome.eq_ignore_ascii_case("yes")
        && !tokens[0].outcome.eq_ignore_ascii_case("yes")
    {
        tokens.swap(0, 1);
    }
    let mut tokens = tokens.into_iter();
    let (yes, no) = match (tokens.next(), tokens.next()) {
        (Some(yes), Some(no)) => (yes, no),
        _ => {
            return Err(PipelineError::MalformedResponse(format!(
                "Missing tokens for {}",
                clob.condition_id
            )))
        }
    };

    let close_time = clob
        .end_date_iso
        .as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Market {
        condition_id: clob.condition_id,
        question: clob.question,
        yes_token_id: yes.token_id,
        no_token_id: no.token_id,
        yes_outcome: yes.outcome,
        no_outcome: no.outcome,
        yes_price: yes.price,
        no_price: no.price,
        tags: clob.tags.unwrap_or_default(),
        close_time,
        volume: clob.volume,
        active: clob.active,
        closed: clob.closed,
        accepting_orders: clob.accepting_orders,
    })
}

fn decode_history(raw: RawHistory) -> Result<Vec<HistoryPoint>, PipelineError> {
    raw.history
        .into_iter()
        .map(|point| {
            let timestamp = Utc.timestamp_opt(point.t, 0).single().ok_or_else(|| {
                PipelineError::MalformedResponse(format!("Invalid timestamp: {}", point.t))
            })?;
            Ok(HistoryPoint {
                timestamp,
                price: point.p,
            })
        })
        .collect()
}
