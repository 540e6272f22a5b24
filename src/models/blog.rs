//! Watchlist, post and notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blog on the watchlist, keyed by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedSite {
    pub site: String,
    /// Most recent post link recorded for this site
    pub last_seen_link: String,
}

impl WatchedSite {
    /// A freshly added site starts with itself as the last seen link.
    pub fn new(site: impl Into<String>) -> Self {
        let site = site.into();
        Self {
            last_seen_link: site.clone(),
            site,
        }
    }
}

/// A post that has been seen at least once for a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPost {
    pub site: String,
    pub link: String,
    pub discovered_at: DateTime<Utc>,
}

/// A queued notification about one new post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub id: u64,
    pub message: String,
    #[serde(default)]
    pub sent: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl PendingNotification {
    /// Render the notification text for a new post.
    pub fn render(site: &str, link: &str) -> String {
        format!("New blog post {link} on blog {site}")
    }
}
