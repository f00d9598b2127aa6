//! Client-side key-value cache for feed payloads.
//!
//! Entries are opaque `{ data, timestamp }` blobs serialized as JSON text,
//! keyed by feed name under a version-tag namespace. Bumping the tag
//! invalidates every entry at once. Only the data layer parses the payload;
//! the store never inspects it.

use crate::error::FeedError;
use crate::utils::now_millis;
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A cached feed payload with its write time in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub data: String,
    pub timestamp: u64,
}

impl CachedEntry {
    pub fn new(data: String) -> Self {
        Self {
            data,
            timestamp: now_millis(),
        }
    }

    /// An entry is fresh iff `now - timestamp < window`.
    pub fn is_fresh(&self, window: Duration) -> bool {
        now_millis().saturating_sub(self.timestamp) < window.as_millis() as u64
    }

    pub fn age_ms(&self) -> u64 {
        now_millis().saturating_sub(self.timestamp)
    }
}

/// Backing store for cache blobs. Put/get/remove are atomic at the key
/// level; concurrent writers to one key race last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn put(&self, key: &str, blob: String) -> Result<(), FeedError>;
    async fn get(&self, key: &str) -> Result<Option<String>, FeedError>;
    async fn remove(&self, key: &str) -> Result<bool, FeedError>;
}

/// In-memory store over a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, String>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn put(&self, key: &str, blob: String) -> Result<(), FeedError> {
        self.entries.insert(key.to_string(), blob);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, FeedError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn remove(&self, key: &str) -> Result<bool, FeedError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// Durable store writing one JSON blob per key under a directory, the
/// localStorage analogue for restarts.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, FeedError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| FeedError::CacheError(format!("Failed to create cache dir: {}", e)))?;
        Ok(Self { dir })
    }

    // Keys contain ':' and full URLs for proxy entries; encode anything that
    // is not filename-safe.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for ch in key.chars() {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
                name.push(ch);
            } else {
                name.push_str(&format!("_{:02x}", ch as u32));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn put(&self, key: &str, blob: String) -> Result<(), FeedError> {
        let path = self.path_for(key);
        tokio::fs::write(&path, blob)
            .await
            .map_err(|e| FeedError::CacheError(format!("Failed to write {}: {}", path.display(), e)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, FeedError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FeedError::CacheError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, FeedError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FeedError::CacheError(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Namespaced, typed view over a [`CacheStore`]. Serializes entries to JSON
/// text and evicts blobs that no longer deserialize.
#[derive(Clone)]
pub struct FeedCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
}

impl FeedCache {
    pub fn new(store: Arc<dyn CacheStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
        }
    }

    fn generate_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub async fn put_entry(&self, key: &str, entry: &CachedEntry) -> Result<(), FeedError> {
        let blob = serde_json::to_string(entry)?;
        let full_key = self.generate_key(key);
        debug!("Cache PUT for key: {}", full_key);
        self.store.put(&full_key, blob).await
    }

    /// Look up an entry. A blob that fails to deserialize is corrupt: it is
    /// evicted and reported so the caller can treat the lookup as a miss.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CachedEntry>, FeedError> {
        let full_key = self.generate_key(key);
        let blob = match self.store.get(&full_key).await? {
            Some(blob) => blob,
            None => {
                debug!("Cache MISS for key: {}", full_key);
                return Ok(None);
            }
        };
        match serde_json::from_str::<CachedEntry>(&blob) {
            Ok(entry) => {
                debug!("Cache HIT for key: {} (age {}ms)", full_key, entry.age_ms());
                Ok(Some(entry))
            }
            Err(e) => {
                warn!("Evicting corrupt cache entry for key {}: {}", full_key, e);
                self.store.remove(&full_key).await?;
                Err(FeedError::CorruptCacheError(format!(
                    "Cache deserialization error for key {}: {}",
                    full_key, e
                )))
            }
        }
    }

    pub async fn remove_entry(&self, key: &str) -> Result<bool, FeedError> {
        self.store.remove(&self.generate_key(key)).await
    }
}
