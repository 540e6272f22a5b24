//! In-process fakes for the link extractor, the mail transport and the
//! repository.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{KnownPost, PendingNotification, WatchedSite};
use crate::services::{LinkExtractor, MailTransport};
use crate::storage::{LocalStorage, Repository};

/// Shared call counter handed out before the fake is moved into an `Arc`.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A fixed link graph. Unknown URLs answer with no links.
#[derive(Default)]
pub struct StaticExtractor {
    pages: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    slow: HashMap<String, Duration>,
    calls: Calls,
}

impl StaticExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, links: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            links.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    pub fn fail(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.slow.insert(url.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }
}

#[async_trait]
impl LinkExtractor for StaticExtractor {
    async fn extract_links(&self, url: &str) -> Result<Vec<String>> {
        self.calls.bump();
        if let Some(delay) = self.slow.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(url) {
            return Err(AppError::crawl(url, "connection refused"));
        }
        Ok(self.pages.get(url).cloned().unwrap_or_default())
    }
}

/// Records delivered messages; messages containing a marker fail.
#[derive(Default)]
pub struct RecordingTransport {
    fail_containing: Vec<String>,
    delivered: Arc<Mutex<Vec<String>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_containing(mut self, marker: &str) -> Self {
        self.fail_containing.push(marker.to_string());
        self
    }

    pub fn delivered(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.delivered)
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &str) -> Result<()> {
        if self.fail_containing.iter().any(|m| message.contains(m)) {
            return Err(AppError::delivery("test", "mailbox unavailable"));
        }
        self.delivered
            .lock()
            .expect("delivered lock poisoned")
            .push(message.to_string());
        Ok(())
    }
}

/// An in-memory store with injectable write failures.
///
/// The first `failing_records` calls to `record_new_post` fail with an I/O
/// error. Each `update_last_seen_link` notes the extractor call count at
/// that moment.
pub struct ScriptedRepository {
    inner: LocalStorage,
    failing_records: AtomicUsize,
    extractor_calls: Calls,
    updates_at: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedRepository {
    pub fn new(inner: LocalStorage) -> Self {
        Self {
            inner,
            failing_records: AtomicUsize::new(0),
            extractor_calls: Calls::default(),
            updates_at: Arc::default(),
        }
    }

    pub fn fail_records(self, count: usize) -> Self {
        self.failing_records.store(count, Ordering::SeqCst);
        self
    }

    pub fn watch_calls(mut self, calls: Calls) -> Self {
        self.extractor_calls = calls;
        self
    }

    pub fn updates_at(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.updates_at)
    }

    fn take_failure(&self) -> bool {
        self.failing_records
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Repository for ScriptedRepository {
    async fn list_sites(&self) -> Result<Vec<WatchedSite>> {
        self.inner.list_sites().await
    }

    async fn site_exists(&self, site: &str) -> Result<bool> {
        self.inner.site_exists(site).await
    }

    async fn add_site(&self, site: &str) -> Result<()> {
        self.inner.add_site(site).await
    }

    async fn remove_site(&self, site: &str) -> Result<bool> {
        self.inner.remove_site(site).await
    }

    async fn update_last_seen_link(&self, site: &str, link: &str) -> Result<()> {
        self.updates_at
            .lock()
            .expect("updates lock poisoned")
            .push(self.extractor_calls.count());
        self.inner.update_last_seen_link(site, link).await
    }

    async fn post_exists(&self, site: &str, link: &str) -> Result<bool> {
        self.inner.post_exists(site, link).await
    }

    async fn insert_post_if_absent(&self, site: &str, link: &str) -> Result<bool> {
        self.inner.insert_post_if_absent(site, link).await
    }

    async fn record_new_post(
        &self,
        site: &str,
        link: &str,
        message: &str,
    ) -> Result<Option<u64>> {
        if self.take_failure() {
            return Err(AppError::Io(std::io::Error::other("disk full")));
        }
        self.inner.record_new_post(site, link, message).await
    }

    async fn posts_for_site(&self, site: &str) -> Result<Vec<KnownPost>> {
        self.inner.posts_for_site(site).await
    }

    async fn enqueue_notification(&self, message: &str) -> Result<u64> {
        self.inner.enqueue_notification(message).await
    }

    async fn fetch_unsent_notifications(&self) -> Result<Vec<PendingNotification>> {
        self.inner.fetch_unsent_notifications().await
    }

    async fn mark_notification_sent(&self, id: u64) -> Result<()> {
        self.inner.mark_notification_sent(id).await
    }
}
