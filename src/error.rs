//! Pipeline error taxonomy
//!
//! Every external call in discovery, price refresh and dispatch reports one
//! of these. The class decides what the caller does next: retry on the next
//! tick, defer, skip, or abort the tick.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the notification pipeline
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Timeout, connection reset or server-side failure
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    /// Provider asked us to back off for the given duration
    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// Payload did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// State could not be written or read back
    #[error("Persistence failure: {0}")]
    Persistence(String),
    /// Provider refused the request and retrying will not help
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl PipelineError {
    /// Whether retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientNetwork(_) | PipelineError::RateLimited(_)
        )
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PipelineError::MalformedResponse(e.to_string())
        } else {
            PipelineError::TransientNetwork(e.to_string())
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Persistence(e.to_string())
    }
}
