// src/pipeline/crawl.rs

//! Bounded link-following discovery for a single site.
//!
//! Traversal is breadth-first over an explicit frontier. Every URL is
//! fetched at most once per traversal, and pages more than `max_depth` hops
//! from the seed are never fetched, so cyclic or endlessly branching link
//! graphs always terminate.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{CrawlOutcome, CrawlerConfig};
use crate::services::LinkExtractor;
use crate::utils::same_host;

/// Crawls one site and reports every link reached.
pub struct CrawlSupervisor {
    extractor: Arc<dyn LinkExtractor>,
    max_depth: usize,
    concurrency: usize,
    same_host_only: bool,
}

impl CrawlSupervisor {
    pub fn new(extractor: Arc<dyn LinkExtractor>, config: &CrawlerConfig) -> Self {
        Self {
            extractor,
            max_depth: config.max_depth,
            concurrency: config.max_concurrent.max(1),
            same_host_only: config.same_host_only,
        }
    }

    /// Crawl `site`, returning all links encountered (duplicates included)
    /// or the error that stopped the traversal.
    pub async fn crawl(&self, site: &str) -> CrawlOutcome {
        match self.traverse(site).await {
            Ok(links) => {
                log::debug!("Crawled {}: {} links", site, links.len());
                CrawlOutcome::Success {
                    site: site.to_string(),
                    links,
                }
            }
            Err(error) => CrawlOutcome::Failure {
                site: site.to_string(),
                error,
            },
        }
    }

    async fn traverse(&self, site: &str) -> Result<Vec<String>> {
        let extractor = &self.extractor;
        let mut visited: HashSet<String> = HashSet::from([site.to_string()]);
        let mut frontier = vec![site.to_string()];
        let mut links = Vec::new();
        let mut depth = 0;

        while !frontier.is_empty() {
            depth += 1;
            let follow = depth <= self.max_depth;
            let mut next = Vec::new();

            let mut pages = stream::iter(frontier)
                .map(|url| async move {
                    let result = extractor.extract_links(&url).await;
                    (url, result)
                })
                .buffer_unordered(self.concurrency);

            while let Some((url, result)) = pages.next().await {
                // Dropping `pages` on error cancels the rest of the level.
                let found = result
                    .map_err(|e| AppError::crawl(site, format!("fetching {url} failed: {e}")))?;

                for link in found {
                    if follow && self.should_follow(site, &link) && visited.insert(link.clone()) {
                        next.push(link.clone());
                    }
                    links.push(link);
                }
            }

            frontier = next;
        }

        Ok(links)
    }

    fn should_follow(&self, site: &str, link: &str) -> bool {
        !self.same_host_only || same_host(site, link)
    }
}
