// src/pipeline/sync.rs

//! One sync cycle: crawl every watched site, record new posts, queue a
//! notification per new post, deliver the queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlerConfig, PendingNotification};
use crate::pipeline::{AggregateReport, CrawlSupervisor, NotificationDispatcher, ResultAggregator};
use crate::services::{LinkExtractor, MailTransport};
use crate::storage::Repository;
use crate::utils::dedup_preserving_order;

/// Counters for one cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sites_total: usize,
    pub sites_failed: usize,
    pub links_found: usize,
    pub new_posts: usize,
    /// Posts that could not be recorded
    pub persist_failures: usize,
    pub notifications_queued: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
}

impl SyncReport {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            sites_total: 0,
            sites_failed: 0,
            links_found: 0,
            new_posts: 0,
            persist_failures: 0,
            notifications_queued: 0,
            delivered: 0,
            delivery_failures: 0,
        }
    }

    /// Log the counters as a summary block.
    pub fn log_summary(&self, title: &str) {
        let elapsed = (self.end_time - self.start_time).num_milliseconds();
        log::info!("[SUMMARY] {}", title);
        log::info!(
            "    Sites: {} crawled, {} failed",
            self.sites_total - self.sites_failed,
            self.sites_failed
        );
        log::info!(
            "    Posts: {} links, {} new, {} not recorded",
            self.links_found,
            self.new_posts,
            self.persist_failures
        );
        log::info!(
            "    Notifications: {} queued, {} delivered, {} failed",
            self.notifications_queued,
            self.delivered,
            self.delivery_failures
        );
        log::info!("    Elapsed: {}ms", elapsed);
    }
}

/// Sequences crawl, persistence and delivery.
pub struct Orchestrator {
    repository: Arc<dyn Repository>,
    aggregator: ResultAggregator,
    dispatcher: Option<NotificationDispatcher>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        repository: Arc<dyn Repository>,
        extractor: Arc<dyn LinkExtractor>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let dispatcher = NotificationDispatcher::new(
            transport,
            Arc::clone(&repository),
            &config.notifier,
        );
        let mut orchestrator = Self::recorder(&config.crawler, repository, extractor);
        orchestrator.dispatcher = Some(dispatcher);
        orchestrator
    }

    /// An orchestrator that records posts but has no transport; only
    /// [`Orchestrator::crawl_only`] can run on it.
    pub fn recorder(
        config: &CrawlerConfig,
        repository: Arc<dyn Repository>,
        extractor: Arc<dyn LinkExtractor>,
    ) -> Self {
        let supervisor = CrawlSupervisor::new(extractor, config);
        let aggregator = ResultAggregator::new(supervisor, Arc::clone(&repository), config);
        Self {
            repository,
            aggregator,
            dispatcher: None,
        }
    }

    /// Run a full cycle.
    ///
    /// Only failures that invalidate the whole cycle are returned; per-site,
    /// per-post and per-message errors are logged and counted.
    pub async fn sync_cycle(&self) -> Result<SyncReport> {
        let dispatcher = self
            .dispatcher
            .as_ref()
            .ok_or_else(|| AppError::config("sync requires a notification transport"))?;

        let mut report = SyncReport::started();
        self.record(&mut report, true).await?;

        let pending = self.repository.fetch_unsent_notifications().await?;
        log::info!("Dispatching {} notifications", pending.len());
        let dispatched = dispatcher.dispatch(pending).await;
        report.delivered = dispatched.delivered.len();
        report.delivery_failures = dispatched.failed.len();

        report.end_time = Utc::now();
        Ok(report)
    }

    /// Crawl and record new posts without queueing notifications.
    pub async fn crawl_only(&self) -> Result<SyncReport> {
        let mut report = SyncReport::started();
        self.record(&mut report, false).await?;
        report.end_time = Utc::now();
        Ok(report)
    }

    async fn record(&self, report: &mut SyncReport, notify: bool) -> Result<()> {
        let sites = self.repository.list_sites().await?;
        report.sites_total = sites.len();
        log::info!("Crawling {} sites", sites.len());

        let AggregateReport {
            links,
            failed_sites,
            ..
        } = self.aggregator.aggregate(&sites).await;
        report.sites_failed = failed_sites;

        for (site, found) in links {
            report.links_found += found.len();
            for link in dedup_preserving_order(found) {
                match self.persist(&site, &link, notify).await {
                    Ok(Some(queued)) => {
                        report.new_posts += 1;
                        if queued {
                            report.notifications_queued += 1;
                        }
                    }
                    Ok(None) => {}
                    Err(error) => {
                        log::warn!("Failed to record {} for {}: {}", link, site, error);
                        report.persist_failures += 1;
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns `None` for an already known post, otherwise whether a
    /// notification was queued for it.
    async fn persist(&self, site: &str, link: &str, notify: bool) -> Result<Option<bool>> {
        if !notify {
            let inserted = self.repository.insert_post_if_absent(site, link).await?;
            if inserted {
                log::info!("New post {} on {}", link, site);
            }
            return Ok(inserted.then_some(false));
        }

        let message = PendingNotification::render(site, link);
        match self.repository.record_new_post(site, link, &message).await? {
            Some(id) => {
                log::info!("New post {} on {}", link, site);
                log::debug!("Queued notification {}", id);
                Ok(Some(true))
            }
            None => Ok(None),
        }
    }
}
