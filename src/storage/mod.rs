//! Storage abstractions for the watchlist, known posts and the
//! notification queue.
//!
//! The sync pipeline only talks to [`Repository`]; implementations must be
//! safe to call from many concurrent tasks. `insert_post_if_absent` and
//! `record_new_post` must check and write as one atomic step.

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{KnownPost, PendingNotification, WatchedSite};

// Re-export for convenience
pub use local::LocalStorage;

/// Persistent store consumed by the sync pipeline and the CLI.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All watched sites.
    async fn list_sites(&self) -> Result<Vec<WatchedSite>>;

    async fn site_exists(&self, site: &str) -> Result<bool>;

    /// Add a site to the watchlist. Fails if it is already watched.
    async fn add_site(&self, site: &str) -> Result<()>;

    /// Remove a site and its known posts. Returns whether it existed.
    async fn remove_site(&self, site: &str) -> Result<bool>;

    async fn update_last_seen_link(&self, site: &str, link: &str) -> Result<()>;

    async fn post_exists(&self, site: &str, link: &str) -> Result<bool>;

    /// Record a post unless already known. Returns `true` if newly inserted.
    async fn insert_post_if_absent(&self, site: &str, link: &str) -> Result<bool>;

    /// Record a post unless already known and queue `message` for it, as one
    /// write. Returns the notification id if the post was new.
    ///
    /// Either both the post and its notification are stored or neither is, so
    /// a failure leaves the post undiscovered for the next cycle.
    async fn record_new_post(&self, site: &str, link: &str, message: &str)
    -> Result<Option<u64>>;

    /// Known posts for one site, in discovery order.
    async fn posts_for_site(&self, site: &str) -> Result<Vec<KnownPost>>;

    /// Queue a notification and return its id.
    async fn enqueue_notification(&self, message: &str) -> Result<u64>;

    /// Notifications not yet marked as sent, oldest first.
    async fn fetch_unsent_notifications(&self) -> Result<Vec<PendingNotification>>;

    async fn mark_notification_sent(&self, id: u64) -> Result<()>;
}
