// src/pipeline/aggregate.rs

//! Fan-out of one crawl per watched site, fan-in of their outcomes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::AppError;
use crate::models::{CrawlOutcome, CrawlerConfig, SiteFailure, WatchedSite};
use crate::pipeline::CrawlSupervisor;
use crate::storage::Repository;

/// Links per successfully crawled site, plus one error per failure.
#[derive(Debug, Default)]
pub struct AggregateReport {
    pub links: HashMap<String, Vec<String>>,
    pub errors: Vec<SiteFailure>,
    /// Sites whose crawl failed (a subset of the sites in `errors`)
    pub failed_sites: usize,
}

/// Runs site crawls concurrently and tolerates individual failures.
pub struct ResultAggregator {
    supervisor: CrawlSupervisor,
    repository: Arc<dyn Repository>,
    concurrency: usize,
    task_timeout: Duration,
}

impl ResultAggregator {
    pub fn new(
        supervisor: CrawlSupervisor,
        repository: Arc<dyn Repository>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            supervisor,
            repository,
            concurrency: config.max_concurrent.max(1),
            task_timeout: Duration::from_secs(config.task_timeout_secs),
        }
    }

    /// Crawl every site once and collect the results.
    ///
    /// Returns only after each launched crawl has produced its outcome. A
    /// successful crawl also moves the site's last seen link to the last
    /// link of its traversal; those updates run once every crawl is done.
    pub async fn aggregate(&self, sites: &[WatchedSite]) -> AggregateReport {
        let mut seen = HashSet::new();
        let jobs: Vec<&str> = sites
            .iter()
            .map(|s| s.site.as_str())
            .filter(|site| seen.insert(*site))
            .collect();

        let mut report = AggregateReport::default();
        let mut outcomes = stream::iter(jobs)
            .map(|site| self.crawl_site(site))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                CrawlOutcome::Success { site, links } => {
                    log::info!("Crawled {}: {} links", site, links.len());
                    report.links.insert(site, links);
                }
                CrawlOutcome::Failure { site, error } => {
                    log::warn!("Failed to crawl {}: {}", site, error);
                    report.failed_sites += 1;
                    report.errors.push(SiteFailure { site, error });
                }
            }
        }

        self.update_last_seen(&mut report).await;
        report
    }

    async fn update_last_seen(&self, report: &mut AggregateReport) {
        for (site, links) in &report.links {
            let Some(last) = links.last() else {
                continue;
            };
            if let Err(error) = self.repository.update_last_seen_link(site, last).await {
                log::warn!("Failed to update last seen link for {}: {}", site, error);
                report.errors.push(SiteFailure {
                    site: site.clone(),
                    error,
                });
            }
        }
    }

    async fn crawl_site(&self, site: &str) -> CrawlOutcome {
        match tokio::time::timeout(self.task_timeout, self.supervisor.crawl(site)).await {
            Ok(outcome) => outcome,
            Err(_) => CrawlOutcome::Failure {
                site: site.to_string(),
                error: AppError::timeout(format!("crawl of {site}"), self.task_timeout),
            },
        }
    }
}
