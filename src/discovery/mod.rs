//! Market discovery
//!
//! Walks the venue's market listing page by page, reporting tracked markets
//! that appeared or closed since the last pass.

mod crawler;

pub use crawler::{Crawler, CrawlerConfig};

use crate::market::Market;

/// Result of one discovery pass
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Tracked markets seen for the first time
    pub new: Vec<Market>,
    /// Tracked markets that closed, resolved or vanished
    pub closed: Vec<Market>,
    /// Untracked markets added to the seen set
    pub untracked_new: usize,
    /// Pages fetched
    pub pages: usize,
    /// Malformed records skipped
    pub skipped: usize,
    /// The pass started at the first page and reached the end
    pub completed_full_pass: bool,
}
