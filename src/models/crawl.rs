//! Transient results of one sync cycle.

use crate::error::AppError;

/// Result of crawling one site. Never persisted.
#[derive(Debug)]
pub enum CrawlOutcome {
    /// Every link reached during the traversal, duplicates included.
    Success { site: String, links: Vec<String> },
    /// The traversal failed somewhere; nothing from it is kept.
    Failure { site: String, error: AppError },
}

/// A per-site error reported by aggregation.
#[derive(Debug)]
pub struct SiteFailure {
    pub site: String,
    pub error: AppError,
}

/// A per-message error reported by dispatch.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub id: u64,
    pub error: AppError,
}
