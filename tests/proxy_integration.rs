//! Integration tests for the background cache proxy.
//!
//! Covers the stale-while-revalidate request path, warm-up, pass-through for
//! unknown URLs, push updates from clients, and update notifications.

use mockito::Matcher;
use ratefeed::{
    cache::{CacheStore, CachedEntry, FeedCache, MemoryCacheStore},
    error::FeedError,
    feeds::{FeedClass, FeedConfig, FeedRegistry},
    fetch::FetchPolicy,
    proxy::{ClientMessage, ProxyNotification},
    CacheProxy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const NAMESPACE: &str = "feed-cache-v3";

fn quick_policy() -> FetchPolicy {
    FetchPolicy {
        timeout: Duration::from_secs(2),
        retries: 0,
        backoff_base: Duration::from_millis(10),
    }
}

fn registry_for(server: &mockito::ServerGuard) -> Arc<FeedRegistry> {
    let feeds = vec![
        FeedConfig::new("exchange", &format!("{}/exchange.csv", server.url()), FeedClass::LiveRates),
        FeedConfig::new("cb", &format!("{}/cb.csv", server.url()), FeedClass::FeeTable),
    ];
    Arc::new(FeedRegistry::new(feeds))
}

fn proxy_with_store(server: &mockito::ServerGuard, store: Arc<dyn CacheStore>) -> CacheProxy {
    CacheProxy::new(registry_for(server), store, NAMESPACE, quick_policy())
}

#[tokio::test]
async fn warm_populates_every_feed_without_notifying() {
    let _ = env_logger::try_init();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchange.csv")
        .match_query(Matcher::Any)
        .with_body("USD,4400")
        .create_async()
        .await;
    server
        .mock("GET", "/cb.csv")
        .match_query(Matcher::Any)
        .with_body("Name,Fee\nA,100")
        .create_async()
        .await;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let proxy = proxy_with_store(&server, store.clone());
    let mut notifications = proxy.subscribe();

    proxy.warm().await;

    let cache = FeedCache::new(store, NAMESPACE);
    let registry = registry_for(&server);
    let exchange = cache.get_entry(&registry.get("exchange").unwrap().url).await.unwrap();
    let cb = cache.get_entry(&registry.get("cb").unwrap().url).await.unwrap();
    assert_eq!(exchange.unwrap().data, "USD,4400");
    assert_eq!(cb.unwrap().data, "Name,Fee\nA,100");

    // Install-time warm-up is silent
    assert!(
        timeout(Duration::from_millis(100), notifications.recv()).await.is_err(),
        "warm-up must not broadcast"
    );
}

#[tokio::test]
async fn cache_miss_fetches_synchronously_and_broadcasts() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchange.csv")
        .match_query(Matcher::Any)
        .with_body("USD,4400")
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let proxy = proxy_with_store(&server, store);
    let mut notifications = proxy.subscribe();

    let canonical = format!("{}/exchange.csv", server.url());
    let response = proxy.handle_request(&canonical).await.unwrap();
    assert!(!response.served_from_cache);
    assert_eq!(response.body, "USD,4400");

    let note = timeout(Duration::from_secs(1), notifications.recv())
        .await
        .expect("notification expected")
        .unwrap();
    match note {
        ProxyNotification::DataUpdated { feed, timestamp } => {
            assert_eq!(feed, "exchange");
            assert!(timestamp > 0);
        }
    }
}

#[tokio::test]
async fn cache_hit_serves_cached_body_then_revalidates_in_background() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchange.csv")
        .match_query(Matcher::Any)
        .with_body("USD,4500")
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let cache = FeedCache::new(store.clone(), NAMESPACE);
    let canonical = format!("{}/exchange.csv", server.url());
    cache.put_entry(&canonical, &CachedEntry::new("USD,4400".to_string())).await.unwrap();

    let proxy = proxy_with_store(&server, store);
    let mut notifications = proxy.subscribe();

    // Cached response is observable before the network response
    let response = proxy.handle_request(&canonical).await.unwrap();
    assert!(response.served_from_cache);
    assert_eq!(response.body, "USD,4400");

    // Background revalidation lands and is broadcast
    let note = timeout(Duration::from_secs(1), notifications.recv())
        .await
        .expect("notification expected")
        .unwrap();
    assert!(matches!(note, ProxyNotification::DataUpdated { ref feed, .. } if feed == "exchange"));

    let refreshed = cache.get_entry(&canonical).await.unwrap().unwrap();
    assert_eq!(refreshed.data, "USD,4500");
}

#[tokio::test]
async fn revalidation_failure_is_silent_when_cache_was_served() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchange.csv")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let cache = FeedCache::new(store.clone(), NAMESPACE);
    let canonical = format!("{}/exchange.csv", server.url());
    cache.put_entry(&canonical, &CachedEntry::new("USD,4400".to_string())).await.unwrap();

    let proxy = proxy_with_store(&server, store);
    let mut notifications = proxy.subscribe();

    let response = proxy.handle_request(&canonical).await.unwrap();
    assert!(response.served_from_cache);
    assert_eq!(response.body, "USD,4400");

    // No broadcast, and the cached entry is untouched
    assert!(timeout(Duration::from_millis(200), notifications.recv()).await.is_err());
    let entry = cache.get_entry(&canonical).await.unwrap().unwrap();
    assert_eq!(entry.data, "USD,4400");
}

#[tokio::test]
async fn unknown_urls_pass_straight_through() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/styles.css")
        .with_body("body{}")
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let proxy = proxy_with_store(&server, store.clone());

    let url = format!("{}/styles.css", server.url());
    let response = proxy.handle_request(&url).await.unwrap();
    assert!(!response.served_from_cache);
    assert_eq!(response.body, "body{}");

    // Pass-through requests are never cached
    let cache = FeedCache::new(store, NAMESPACE);
    assert!(cache.get_entry(&url).await.unwrap().is_none());
}

#[tokio::test]
async fn push_update_writes_cache_under_canonical_url() {
    let server = mockito::Server::new_async().await;
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let proxy = proxy_with_store(&server, store.clone());

    proxy
        .handle_message(ClientMessage::UpdateSheet {
            feed: "cb".to_string(),
            data: "X,Y\n1,2".to_string(),
        })
        .await
        .unwrap();

    let canonical = format!("{}/cb.csv", server.url());
    let cache = FeedCache::new(store, NAMESPACE);
    let entry = cache.get_entry(&canonical).await.unwrap().unwrap();
    assert_eq!(entry.data, "X,Y\n1,2");

    // A subsequent intercepted request is served from that pushed entry
    let response = proxy.handle_request(&canonical).await.unwrap();
    assert!(response.served_from_cache);
    assert_eq!(response.body, "X,Y\n1,2");
}

#[tokio::test]
async fn push_update_for_unknown_feed_is_rejected() {
    let server = mockito::Server::new_async().await;
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let proxy = proxy_with_store(&server, store);

    let err = proxy
        .handle_message(ClientMessage::UpdateSheet {
            feed: "nonexistent".to_string(),
            data: "X".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::UnknownFeed(_)), "got {:?}", err);
}
