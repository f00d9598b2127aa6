pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod feeds;
pub mod fetch;
pub mod proxy;
pub mod rows;
pub mod utils;

// Re-export the types most callers need
pub use cache::{CacheStore, CachedEntry, FeedCache, FileCacheStore, MemoryCacheStore};
pub use client::{DataSource, FeedClient, FeedData};
pub use error::FeedError;
pub use feeds::{FeedClass, FeedConfig, FeedFormat, FeedRegistry};
pub use fetch::{fetch_with_retry, FetchPolicy};
pub use proxy::{CacheProxy, ClientMessage, ProxyNotification, ProxyResponse};
