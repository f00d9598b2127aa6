use crate::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use crate::error::FeedError;
use crate::feeds::FeedRegistry;
use crate::fetch::FetchPolicy;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_namespace: String,
    pub cache_dir: Option<String>,
    pub fetch_timeout_ms: u64,
    pub fetch_retries: u32,
    pub retry_backoff_ms: u64,
    pub refresh_interval_secs: u64,
    pub live_rates_ttl_secs: Option<u64>,
    pub fee_table_ttl_secs: Option<u64>,
    pub feed_url_overrides: Option<HashMap<String, String>>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            cache_namespace: env::var("CACHE_NAMESPACE")
                .unwrap_or_else(|_| "feed-cache-v3".to_string()),
            cache_dir: env::var("CACHE_DIR").ok(),
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10000),
            fetch_retries: env::var("FETCH_RETRIES")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            retry_backoff_ms: env::var("RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            refresh_interval_secs: env::var("REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            live_rates_ttl_secs: env::var("LIVE_RATES_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
            fee_table_ttl_secs: env::var("FEE_TABLE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
            feed_url_overrides: env::var("FEED_URL_OVERRIDES").ok().map(|s| {
                s.split(';')
                    .filter_map(|part| {
                        let mut kv = part.splitn(2, '=');
                        let key = kv.next()?.trim().to_string();
                        let value = kv.next()?.trim().to_string();
                        if key.is_empty() || value.is_empty() {
                            None
                        } else {
                            Some((key, value))
                        }
                    })
                    .collect()
            }),
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_millis(self.fetch_timeout_ms),
            retries: self.fetch_retries,
            backoff_base: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Build the feed registry with URL overrides and TTL policy applied.
    pub fn build_registry(&self) -> FeedRegistry {
        let mut registry = FeedRegistry::builtin();
        if let Some(overrides) = &self.feed_url_overrides {
            for (key, url) in overrides {
                registry.override_url(key, url);
            }
        }
        registry.with_windows(
            Duration::from_secs(self.live_rates_ttl_secs.unwrap_or(60)),
            Duration::from_secs(self.fee_table_ttl_secs.unwrap_or(60 * 60)),
        )
    }

    /// Build the cache store: file-backed when a cache dir is configured,
    /// in-memory otherwise.
    pub fn build_store(&self) -> Result<Arc<dyn CacheStore>, FeedError> {
        match &self.cache_dir {
            Some(dir) => Ok(Arc::new(FileCacheStore::new(dir)?)),
            None => Ok(Arc::new(MemoryCacheStore::new())),
        }
    }

    pub fn validate_and_log(&self) {
        log::info!("Application Configuration Loaded: {:?}", self);
        if self.fetch_timeout_ms == 0 {
            log::error!("FETCH_TIMEOUT_MS cannot be zero.");
        }
    }
}
