//! Cache-first feed loader: the client data layer.
//!
//! Serves fresh cache hits without touching the network, refetches stale or
//! missing entries, and degrades to stale data when the network fails. An
//! attached proxy handle receives a push update after every successful
//! network load so other client contexts see the new payload without
//! refetching.

use crate::cache::{CacheStore, CachedEntry, FeedCache};
use crate::error::FeedError;
use crate::feeds::{FeedConfig, FeedRegistry};
use crate::fetch::{cache_busted_url, fetch_with_retry, FetchPolicy};
use crate::proxy::{CacheProxy, ClientMessage};
use crate::rows::{parse_body, Row};
use log::{debug, info, warn};
use std::sync::Arc;

/// Where the returned rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Fresh cache hit, zero network calls
    Cache,
    /// Fetched from the network this call
    Network,
    /// Network failed; stale cached data returned instead
    StaleFallback,
}

/// Rows handed back by the loader, with provenance.
#[derive(Debug, Clone)]
pub struct FeedData {
    pub feed: String,
    pub rows: Vec<Row>,
    pub fetched_at: u64,
    pub source: DataSource,
}

/// Explicit client context: storage handle, feed registry, HTTP client and
/// retry policy, injected rather than ambient.
#[derive(Clone)]
pub struct FeedClient {
    registry: Arc<FeedRegistry>,
    cache: FeedCache,
    http: reqwest::Client,
    policy: FetchPolicy,
    proxy: Option<CacheProxy>,
}

impl FeedClient {
    pub fn new(
        registry: Arc<FeedRegistry>,
        store: Arc<dyn CacheStore>,
        namespace: &str,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            registry,
            cache: FeedCache::new(store, namespace),
            http: reqwest::Client::new(),
            policy,
            proxy: None,
        }
    }

    /// Attach a proxy handle; successful network loads will push their raw
    /// payload to it so the shared cache stays current across contexts.
    pub fn with_proxy(mut self, proxy: CacheProxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Load a feed cache-first.
    ///
    /// Fresh cache hit: return it, no network call. Miss or stale: fetch
    /// with retry, overwrite the cache entry (last-write-wins), return the
    /// fresh rows. Fetch failure with a stale entry on hand degrades to the
    /// stale rows with a warning; with no entry at all the typed error
    /// surfaces to the caller.
    pub async fn load(&self, key: &str) -> Result<FeedData, FeedError> {
        let feed = self
            .registry
            .get(key)
            .ok_or_else(|| FeedError::UnknownFeed(key.to_string()))?
            .clone();
        let window = self
            .registry
            .freshness_window(key)
            .ok_or_else(|| FeedError::UnknownFeed(key.to_string()))?;

        // Corrupt entries are evicted inside the cache layer; from here they
        // look like a miss.
        let mut cached = match self.cache.get_entry(key).await {
            Ok(entry) => entry,
            Err(FeedError::CorruptCacheError(_)) => None,
            Err(e) => return Err(e),
        };

        if let Some(entry) = &cached {
            if entry.is_fresh(window) {
                match parse_body(feed.format, &entry.data) {
                    Ok(rows) => {
                        debug!("Feed '{}' served from cache (age {}ms)", key, entry.age_ms());
                        return Ok(FeedData {
                            feed: key.to_string(),
                            rows,
                            fetched_at: entry.timestamp,
                            source: DataSource::Cache,
                        });
                    }
                    Err(e) => {
                        // Stored blob deserialized but its payload no longer
                        // parses: corrupt, evict and fall through to a fetch.
                        warn!("Evicting unparsable cache entry for feed '{}': {}", key, e);
                        self.cache.remove_entry(key).await?;
                        cached = None;
                    }
                }
            }
        }

        match self.fetch_feed(&feed).await {
            Ok((rows, entry)) => {
                self.push_to_proxy(&feed, &entry.data).await;
                Ok(FeedData {
                    feed: key.to_string(),
                    rows,
                    fetched_at: entry.timestamp,
                    source: DataSource::Network,
                })
            }
            Err(e) => match cached {
                Some(entry) => {
                    // The stale entry stays the source of truth; the failure
                    // is only a background warning.
                    warn!("Refresh for feed '{}' failed, serving stale data: {}", key, e);
                    let rows = match parse_body(feed.format, &entry.data) {
                        Ok(rows) => rows,
                        Err(parse_err) => {
                            warn!(
                                "Evicting unparsable stale entry for feed '{}': {}",
                                key, parse_err
                            );
                            self.cache.remove_entry(key).await?;
                            return Err(e);
                        }
                    };
                    Ok(FeedData {
                        feed: key.to_string(),
                        rows,
                        fetched_at: entry.timestamp,
                        source: DataSource::StaleFallback,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Warm every fee table sequentially, the startup preload. Failures are
    /// logged and skipped.
    pub async fn preload(&self) {
        for key in self.registry.fee_table_keys() {
            match self.load(&key).await {
                Ok(data) => debug!("Preloaded feed '{}' ({} rows)", key, data.rows.len()),
                Err(e) => warn!("Preload for feed '{}' failed: {}", key, e),
            }
        }
        info!("Fee table preload complete");
    }

    async fn fetch_feed(&self, feed: &FeedConfig) -> Result<(Vec<Row>, CachedEntry), FeedError> {
        let busted = cache_busted_url(&feed.url)?;
        let body = fetch_with_retry(&self.http, &busted, &self.policy).await?;
        let rows = parse_body(feed.format, &body)?;

        let entry = CachedEntry::new(body);
        self.cache.put_entry(&feed.key, &entry).await?;
        Ok((rows, entry))
    }

    async fn push_to_proxy(&self, feed: &FeedConfig, data: &str) {
        if let Some(proxy) = &self.proxy {
            let message = ClientMessage::UpdateSheet {
                feed: feed.key.clone(),
                data: data.to_string(),
            };
            if let Err(e) = proxy.handle_message(message).await {
                warn!("Push update for feed '{}' failed: {}", feed.key, e);
            }
        }
    }
}
