//! Background cache proxy: the service-worker side of the app, reimplemented
//! as an explicit component.
//!
//! Sits between the client data layer and the network. Requests for known
//! feed URLs are answered from the cache immediately while a background
//! revalidation refreshes the entry and broadcasts an update notification to
//! every subscriber. Clients can also push a payload straight into the cache
//! without the proxy fetching anything. Entries are only ever overwritten by
//! this component, never deleted.

use crate::cache::{CacheStore, CachedEntry, FeedCache};
use crate::error::FeedError;
use crate::feeds::{FeedConfig, FeedRegistry};
use crate::fetch::{cache_busted_url, fetch_with_retry, FetchPolicy};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

const NOTIFICATION_CHANNEL_SIZE: usize = 64;

/// Client-to-proxy messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Push a raw payload into the shared cache under the feed's canonical
    /// URL, bypassing the network.
    UpdateSheet { feed: String, data: String },
}

/// Proxy-to-client notifications, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProxyNotification {
    /// A feed's cache entry was replaced with fresh network data.
    DataUpdated { feed: String, timestamp: u64 },
}

/// Response handed back by [`CacheProxy::handle_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub body: String,
    pub served_from_cache: bool,
}

/// The proxy itself. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct CacheProxy {
    registry: Arc<FeedRegistry>,
    cache: FeedCache,
    http: reqwest::Client,
    policy: FetchPolicy,
    notifier: broadcast::Sender<ProxyNotification>,
}

impl CacheProxy {
    pub fn new(
        registry: Arc<FeedRegistry>,
        store: Arc<dyn CacheStore>,
        namespace: &str,
        policy: FetchPolicy,
    ) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        Self {
            registry,
            cache: FeedCache::new(store, namespace),
            http: reqwest::Client::new(),
            policy,
            notifier,
        }
    }

    /// Subscribe to update notifications. Every open client context gets its
    /// own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyNotification> {
        self.notifier.subscribe()
    }

    /// Eagerly populate the cache for every registered feed. Individual
    /// failures are logged and skipped; warm-up never aborts startup.
    pub async fn warm(&self) {
        info!("Warming cache for {} feeds", self.registry.len());
        for feed in self.registry.iter() {
            match self.fetch_and_store(feed, false).await {
                Ok(_) => debug!("Warmed cache for feed '{}'", feed.key),
                Err(e) => warn!("Cache warm-up for feed '{}' failed: {}", feed.key, e),
            }
        }
    }

    /// Handle an intercepted request.
    ///
    /// Known feed URLs are answered stale-while-revalidate: a cached entry is
    /// returned immediately and refreshed in the background, with a
    /// `DataUpdated` broadcast on success and silence on failure. A cache
    /// miss falls through to a synchronous fetch. Unknown URLs pass straight
    /// through to the network.
    pub async fn handle_request(&self, request_url: &str) -> Result<ProxyResponse, FeedError> {
        let feed = match self.registry.match_url(request_url) {
            Some(feed) => feed.clone(),
            None => {
                debug!("Pass-through request: {}", request_url);
                let response = self.http.get(request_url).send().await?;
                if !response.status().is_success() {
                    return Err(FeedError::NetworkError(format!(
                        "Response was not ok: {} for {}",
                        response.status(),
                        request_url
                    )));
                }
                return Ok(ProxyResponse {
                    body: response.text().await?,
                    served_from_cache: false,
                });
            }
        };

        // Corrupt entries were already evicted by the cache layer; treat
        // them as a plain miss here.
        let cached = match self.cache.get_entry(&feed.url).await {
            Ok(entry) => entry,
            Err(FeedError::CorruptCacheError(_)) => None,
            Err(e) => return Err(e),
        };

        match cached {
            Some(entry) => {
                let proxy = self.clone();
                let feed_key = feed.key.clone();
                tokio::spawn(async move {
                    if let Err(e) = proxy.fetch_and_store(&feed, true).await {
                        // The cached answer was already served; stay quiet.
                        debug!("Background revalidation for '{}' failed: {}", feed_key, e);
                    }
                });
                Ok(ProxyResponse {
                    body: entry.data,
                    served_from_cache: true,
                })
            }
            None => {
                let entry = self.fetch_and_store(&feed, true).await?;
                Ok(ProxyResponse {
                    body: entry.data,
                    served_from_cache: false,
                })
            }
        }
    }

    /// Handle an out-of-band message from a client context.
    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), FeedError> {
        match message {
            ClientMessage::UpdateSheet { feed, data } => {
                let config = self
                    .registry
                    .get(&feed)
                    .ok_or_else(|| FeedError::UnknownFeed(feed.clone()))?;
                debug!("Push update for feed '{}' ({} bytes)", feed, data.len());
                self.cache.put_entry(&config.url, &CachedEntry::new(data)).await
            }
        }
    }

    /// Fetch a feed from the network (cache-busted), overwrite its cache
    /// entry, and optionally broadcast the update.
    async fn fetch_and_store(
        &self,
        feed: &FeedConfig,
        notify: bool,
    ) -> Result<CachedEntry, FeedError> {
        let busted = cache_busted_url(&feed.url)?;
        let body = fetch_with_retry(&self.http, &busted, &self.policy).await?;
        let entry = CachedEntry::new(body);
        self.cache.put_entry(&feed.url, &entry).await?;

        if notify {
            // Fire-and-forget; a send error just means nobody is listening
            let _ = self.notifier.send(ProxyNotification::DataUpdated {
                feed: feed.key.clone(),
                timestamp: entry.timestamp,
            });
        }
        Ok(entry)
    }
}
