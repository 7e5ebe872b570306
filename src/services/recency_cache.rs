use crate::adapters::cache::CacheStore;
use crate::domain::notice::Notice;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bound on how many recent notices the cache keeps.
pub const MAX_SIZE: usize = 50;

const KEY_NOTICES: &str = "recent_notices";
const KEY_IDS: &str = "new_notices_set";
const KEY_META: &str = "cache_info";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMeta {
    pub size: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub max_size: usize,
    pub is_initialized: bool,
}

impl Default for CacheMeta {
    fn default() -> Self {
        Self { size: 0, last_updated: None, max_size: MAX_SIZE, is_initialized: false }
    }
}

/// Bounded top-N set of recently seen notices plus the id set used as the
/// diff oracle. State lives in the shared cache so a process bounce against a
/// warm backend does not re-notify old rows. Operations are serialized by an
/// internal lock; only the crawl scheduler mutates this.
#[derive(Clone, Debug)]
pub struct RecencyCache {
    store: Arc<dyn CacheStore>,
    lock: Arc<Mutex<()>>,
}

impl RecencyCache {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store, lock: Arc::new(Mutex::new(())) }
    }

    /// Seeds the cache from a fresh crawl. A warm surviving cache is left
    /// untouched apart from its meta so a restart cannot clobber the diff
    /// state.
    ///
    /// # Errors
    /// Returns an error if the backend write fails.
    #[tracing::instrument(level = "debug", skip_all, fields(count = notices.len()), err)]
    pub async fn initialize(&self, mut notices: Vec<Notice>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let existing = self.load_notices().await?;
        if !existing.is_empty() {
            tracing::info!(size = existing.len(), "Recency cache already warm, keeping existing state");
            self.store_meta(existing.len(), true).await?;
            return Ok(());
        }

        notices.sort_by(|a, b| b.num.cmp(&a.num));
        notices.truncate(MAX_SIZE);
        self.persist(&notices).await?;
        Ok(())
    }

    /// Returns the crawled notices whose `num` has not been seen yet. Backend
    /// failures degrade to treating everything as new; re-notifying beats
    /// silently dropping.
    pub async fn find_new(&self, crawled: &[Notice]) -> Vec<Notice> {
        let _guard = self.lock.lock().await;
        match self.known_ids().await {
            Ok(Some(ids)) => crawled.iter().filter(|n| !ids.contains(&n.num)).cloned().collect(),
            Ok(None) => crawled.to_vec(),
            Err(e) => {
                tracing::warn!(error = %e, "Recency cache unreadable, treating the whole crawl as new");
                crawled.to_vec()
            }
        }
    }

    /// Merges the crawl into the cache and returns how many notices were new.
    /// Runs even when the diff is empty so `lastUpdated` stays fresh.
    ///
    /// # Errors
    /// Returns an error if the backend read or write fails.
    #[tracing::instrument(level = "debug", skip_all, fields(count = crawled.len()), err)]
    pub async fn update(&self, crawled: &[Notice]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let existing = self.load_notices().await?;
        let known: HashSet<i64> = existing.iter().map(|n| n.num).collect();
        let new: Vec<Notice> = crawled.iter().filter(|n| !known.contains(&n.num)).cloned().collect();
        if new.is_empty() {
            self.store_meta(existing.len(), true).await?;
            return Ok(0);
        }

        let added = new.len();
        let mut merged = new;
        merged.extend(existing);
        merged.sort_by(|a, b| b.num.cmp(&a.num));
        merged.truncate(MAX_SIZE);
        self.persist(&merged).await?;
        Ok(added)
    }

    /// # Errors
    /// Returns an error if the backend read fails.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Notice>> {
        let mut notices = self.load_notices().await?;
        notices.truncate(limit.min(MAX_SIZE));
        Ok(notices)
    }

    /// # Errors
    /// Returns an error if the backend delete fails.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.delete(KEY_NOTICES).await?;
        self.store.delete(KEY_IDS).await?;
        self.store.delete(KEY_META).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the backend read fails.
    pub async fn meta(&self) -> Result<CacheMeta> {
        let raw = self.store.get(KEY_META).await?;
        Ok(raw.and_then(|bytes| serde_json::from_slice(&bytes).ok()).unwrap_or_default())
    }

    pub async fn is_initialized(&self) -> bool {
        self.meta().await.map(|m| m.is_initialized).unwrap_or(false)
    }

    /// The diff oracle. When the meta says uninitialized but notices survived
    /// a restart, the id set is rebuilt from them and the cache marks itself
    /// initialized; this is what keeps a cold start against a warm backend
    /// from re-notifying.
    async fn known_ids(&self) -> anyhow::Result<Option<HashSet<i64>>> {
        let meta: CacheMeta =
            self.store.get(KEY_META).await?.and_then(|b| serde_json::from_slice(&b).ok()).unwrap_or_default();
        if meta.is_initialized
            && let Some(raw) = self.store.get(KEY_IDS).await?
            && let Ok(ids) = serde_json::from_slice::<Vec<i64>>(&raw)
        {
            return Ok(Some(ids.into_iter().collect()));
        }

        let notices: Vec<Notice> =
            self.store.get(KEY_NOTICES).await?.and_then(|b| serde_json::from_slice(&b).ok()).unwrap_or_default();
        if notices.is_empty() {
            return Ok(None);
        }

        tracing::info!(size = notices.len(), "Rebuilding recency id set from persisted notices");
        let ids: Vec<i64> = notices.iter().map(|n| n.num).collect();
        self.store.set(KEY_IDS, &serde_json::to_vec(&ids)?).await?;
        self.store_meta(notices.len(), true).await?;
        Ok(Some(ids.into_iter().collect()))
    }

    async fn load_notices(&self) -> anyhow::Result<Vec<Notice>> {
        let raw = self.store.get(KEY_NOTICES).await?;
        Ok(raw.and_then(|bytes| serde_json::from_slice(&bytes).ok()).unwrap_or_default())
    }

    async fn persist(&self, notices: &[Notice]) -> anyhow::Result<()> {
        let ids: Vec<i64> = notices.iter().map(|n| n.num).collect();
        self.store.set(KEY_NOTICES, &serde_json::to_vec(notices)?).await?;
        self.store.set(KEY_IDS, &serde_json::to_vec(&ids)?).await?;
        self.store_meta(notices.len(), true).await?;
        Ok(())
    }

    async fn store_meta(&self, size: usize, is_initialized: bool) -> anyhow::Result<()> {
        let meta = CacheMeta { size, last_updated: Some(Utc::now()), max_size: MAX_SIZE, is_initialized };
        self.store.set(KEY_META, &serde_json::to_vec(&meta)?).await?;
        Ok(())
    }
}
