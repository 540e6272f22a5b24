//! Local filesystem storage implementation.
//!
//! The whole store is one JSON document, rewritten atomically after every
//! mutation. A single async mutex serialises access, which makes every
//! check-then-write sequence atomic for concurrent callers.
//!
//! Each mutation clones the state and rewrites the whole file, so its cost
//! grows with the store. A new post and its notification are written
//! together, one rewrite per new post.
//!
//! ## Document Layout
//!
//! ```text
//! {
//!   "sites":         [{ "site": ..., "last_seen_link": ... }],
//!   "posts":         [{ "site": ..., "link": ..., "discovered_at": ... }],
//!   "notifications": [{ "id": 1, "message": ..., "sent": false, ... }],
//!   "next_id":       2
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{KnownPost, PendingNotification, WatchedSite};
use crate::storage::Repository;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    sites: Vec<WatchedSite>,
    #[serde(default)]
    posts: Vec<KnownPost>,
    #[serde(default)]
    notifications: Vec<PendingNotification>,
    #[serde(default = "first_id")]
    next_id: u64,

    /// (site, link) lookup for `posts`, rebuilt on load
    #[serde(skip)]
    post_index: HashSet<(String, String)>,
}

fn first_id() -> u64 {
    1
}

impl StoreState {
    fn empty() -> Self {
        Self {
            next_id: first_id(),
            ..Self::default()
        }
    }

    fn rebuild_index(&mut self) {
        self.post_index = self
            .posts
            .iter()
            .map(|p| (p.site.clone(), p.link.clone()))
            .collect();
    }

    fn site_mut(&mut self, site: &str) -> Option<&mut WatchedSite> {
        self.sites.iter_mut().find(|s| s.site == site)
    }

    fn has_site(&self, site: &str) -> bool {
        self.sites.iter().any(|s| s.site == site)
    }

    fn has_post(&self, site: &str, link: &str) -> bool {
        self.post_index
            .contains(&(site.to_string(), link.to_string()))
    }

    /// Insert a post for a watched site. Returns `false` if already known.
    fn insert_post(&mut self, site: &str, link: &str) -> Result<bool> {
        if !self.has_site(site) {
            return Err(AppError::not_found(format!("site {site}")));
        }
        if self.has_post(site, link) {
            return Ok(false);
        }
        self.posts.push(KnownPost {
            site: site.to_string(),
            link: link.to_string(),
            discovered_at: Utc::now(),
        });
        self.post_index
            .insert((site.to_string(), link.to_string()));
        Ok(true)
    }

    fn push_notification(&mut self, message: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.notifications.push(PendingNotification {
            id,
            message: message.to_string(),
            sent: false,
            created_at: Utc::now(),
            sent_at: None,
        });
        id
    }
}

/// JSON-file backed repository.
pub struct LocalStorage {
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl LocalStorage {
    /// Open the store at `path`. A missing file yields an empty store; it is
    /// created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = match read_json::<StoreState>(&path).await? {
            Some(state) => state,
            None => StoreState::empty(),
        };
        state.rebuild_index();

        log::debug!(
            "Opened store {} ({} sites, {} posts)",
            path.display(),
            state.sites.len(),
            state.posts.len()
        );

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// A store without a backing file.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::empty()),
        }
    }

    /// Write the store file if it does not exist yet.
    pub async fn init(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        if tokio::fs::try_exists(path).await? {
            return Ok(false);
        }
        let state = self.state.lock().await;
        write_json(path, &*state).await?;
        Ok(true)
    }

    /// Read-only fast path: `Ok(true)` if the post is already known.
    async fn is_known(&self, site: &str, link: &str) -> Result<bool> {
        let state = self.state.lock().await;
        if !state.has_site(site) {
            return Err(AppError::not_found(format!("site {site}")));
        }
        Ok(state.has_post(site, link))
    }

    /// Apply `f` to a copy of the state, persist it, then publish it.
    ///
    /// The lock is held across the write, so a failed write leaves the
    /// in-memory state untouched.
    async fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let value = f(&mut next)?;
        if let Some(path) = &self.path {
            write_json(path, &next).await?;
        }
        *guard = next;
        Ok(value)
    }
}

#[async_trait]
impl Repository for LocalStorage {
    async fn list_sites(&self) -> Result<Vec<WatchedSite>> {
        Ok(self.state.lock().await.sites.clone())
    }

    async fn site_exists(&self, site: &str) -> Result<bool> {
        Ok(self.state.lock().await.has_site(site))
    }

    async fn add_site(&self, site: &str) -> Result<()> {
        self.mutate(|state| {
            if state.has_site(site) {
                return Err(AppError::conflict(format!("site {site}")));
            }
            state.sites.push(WatchedSite::new(site));
            Ok(())
        })
        .await
    }

    async fn remove_site(&self, site: &str) -> Result<bool> {
        if !self.site_exists(site).await? {
            return Ok(false);
        }
        self.mutate(|state| {
            let before = state.sites.len();
            state.sites.retain(|s| s.site != site);
            state.posts.retain(|p| p.site != site);
            state.rebuild_index();
            Ok(state.sites.len() != before)
        })
        .await
    }

    async fn update_last_seen_link(&self, site: &str, link: &str) -> Result<()> {
        self.mutate(|state| {
            let entry = state
                .site_mut(site)
                .ok_or_else(|| AppError::not_found(format!("site {site}")))?;
            entry.last_seen_link = link.to_string();
            Ok(())
        })
        .await
    }

    async fn post_exists(&self, site: &str, link: &str) -> Result<bool> {
        Ok(self.state.lock().await.has_post(site, link))
    }

    async fn insert_post_if_absent(&self, site: &str, link: &str) -> Result<bool> {
        if self.is_known(site, link).await? {
            return Ok(false);
        }
        // Re-checked under the mutation lock; another task may have won.
        self.mutate(|state| state.insert_post(site, link)).await
    }

    async fn record_new_post(
        &self,
        site: &str,
        link: &str,
        message: &str,
    ) -> Result<Option<u64>> {
        if self.is_known(site, link).await? {
            return Ok(None);
        }
        self.mutate(|state| {
            if !state.insert_post(site, link)? {
                return Ok(None);
            }
            Ok(Some(state.push_notification(message)))
        })
        .await
    }

    async fn posts_for_site(&self, site: &str) -> Result<Vec<KnownPost>> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .iter()
            .filter(|p| p.site == site)
            .cloned()
            .collect())
    }

    async fn enqueue_notification(&self, message: &str) -> Result<u64> {
        self.mutate(|state| Ok(state.push_notification(message)))
            .await
    }

    async fn fetch_unsent_notifications(&self) -> Result<Vec<PendingNotification>> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| !n.sent)
            .cloned()
            .collect())
    }

    async fn mark_notification_sent(&self, id: u64) -> Result<()> {
        self.mutate(|state| {
            let notification = state
                .notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| AppError::not_found(format!("notification {id}")))?;
            notification.sent = true;
            notification.sent_at = Some(Utc::now());
            Ok(())
        })
        .await
    }
}

/// Ensure parent directory exists.
async fn ensure_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Write bytes atomically (write to temp, then rename).
async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_dir(path).await?;

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &bytes).await
}

/// Read JSON data, returning None if the file doesn't exist.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    const SITE: &str = "http://example.test/blog";

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::open(tmp.path().join("blogs.json")).await.unwrap();
        assert!(storage.list_sites().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_init_creates_file_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data/blogs.json");
        let storage = LocalStorage::open(&path).await.unwrap();

        assert!(storage.init().await.unwrap());
        assert!(path.exists());
        assert!(!storage.init().await.unwrap());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blogs.json");
        {
            let storage = LocalStorage::open(&path).await.unwrap();
            storage.add_site(SITE).await.unwrap();
            assert!(storage.insert_post_if_absent(SITE, "/post1").await.unwrap());
            storage.enqueue_notification("hello").await.unwrap();
        }

        let storage = LocalStorage::open(&path).await.unwrap();
        assert!(storage.site_exists(SITE).await.unwrap());
        assert!(storage.post_exists(SITE, "/post1").await.unwrap());
        assert!(!storage.insert_post_if_absent(SITE, "/post1").await.unwrap());
        assert_eq!(storage.enqueue_notification("again").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_site_twice_conflicts() {
        let storage = LocalStorage::in_memory();
        storage.add_site(SITE).await.unwrap();
        let err = storage.add_site(SITE).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_remove_site_cascades_to_posts() {
        let storage = LocalStorage::in_memory();
        storage.add_site(SITE).await.unwrap();
        storage.add_site("http://other.test").await.unwrap();
        storage.insert_post_if_absent(SITE, "/post1").await.unwrap();
        storage
            .insert_post_if_absent("http://other.test", "/x")
            .await
            .unwrap();

        assert!(storage.remove_site(SITE).await.unwrap());
        assert!(!storage.remove_site(SITE).await.unwrap());
        assert!(!storage.post_exists(SITE, "/post1").await.unwrap());
        assert!(storage.posts_for_site(SITE).await.unwrap().is_empty());
        assert_eq!(storage.posts_for_site("http://other.test").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_post_for_unknown_site_fails() {
        let storage = LocalStorage::in_memory();
        let err = storage.insert_post_if_absent(SITE, "/post1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_inserts_create_one_post() {
        let storage = Arc::new(LocalStorage::in_memory());
        storage.add_site(SITE).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move { storage.insert_post_if_absent(SITE, "/post1").await })
            })
            .collect();

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(storage.posts_for_site(SITE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_new_post_queues_once() {
        let storage = LocalStorage::in_memory();
        storage.add_site(SITE).await.unwrap();

        let id = storage.record_new_post(SITE, "/post1", "new post").await.unwrap();
        assert!(id.is_some());
        assert_eq!(storage.record_new_post(SITE, "/post1", "new post").await.unwrap(), None);

        let unsent = storage.fetch_unsent_notifications().await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(Some(unsent[0].id), id);
        assert!(storage.post_exists(SITE, "/post1").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_record_keeps_post_unknown() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let storage = LocalStorage::open(dir.join("blogs.json")).await.unwrap();
        storage.add_site(SITE).await.unwrap();

        // Turn the store directory into a file so the next write fails.
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, b"").unwrap();

        assert!(storage.record_new_post(SITE, "/post1", "new post").await.is_err());
        assert!(!storage.post_exists(SITE, "/post1").await.unwrap());
        assert!(storage.fetch_unsent_notifications().await.unwrap().is_empty());

        std::fs::remove_file(&dir).unwrap();
        let id = storage.record_new_post(SITE, "/post1", "new post").await.unwrap();
        assert!(id.is_some());
        assert_eq!(storage.fetch_unsent_notifications().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_new_post_for_unknown_site_fails() {
        let storage = LocalStorage::in_memory();
        let err = storage.record_new_post(SITE, "/post1", "x").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(storage.fetch_unsent_notifications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_sent_removes_from_unsent() {
        let storage = LocalStorage::in_memory();
        let first = storage.enqueue_notification("one").await.unwrap();
        let second = storage.enqueue_notification("two").await.unwrap();

        storage.mark_notification_sent(first).await.unwrap();

        let unsent = storage.fetch_unsent_notifications().await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].id, second);
        assert!(storage.mark_notification_sent(99).await.is_err());
    }

    #[tokio::test]
    async fn test_update_last_seen_link() {
        let storage = LocalStorage::in_memory();
        storage.add_site(SITE).await.unwrap();
        storage.update_last_seen_link(SITE, "/post2").await.unwrap();

        let sites = storage.list_sites().await.unwrap();
        assert_eq!(sites[0].last_seen_link, "/post2");
        assert!(storage.update_last_seen_link("http://nope.test", "/x").await.is_err());
    }
}
