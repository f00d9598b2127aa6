//! Retryable fetch with a per-attempt timeout.
//!
//! Each attempt is raced against the timeout; dropping the request future
//! aborts it, so neither timers nor in-flight requests outlive the call.
//! Retries back off by `backoff_base * attempt_number` before the next try.

use crate::error::FeedError;
use chrono::Utc;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use url::Url;

/// Timeout/retry policy applied to every feed request.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff_base: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 1,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Fetch `url`, retrying on failure per `policy`, returning the body text of
/// the first successful response.
///
/// Fails with `TimeoutError` only when every attempt timed out, and
/// `NetworkError` when the final attempt failed on transport or a
/// non-success status.
pub async fn fetch_with_retry(
    client: &reqwest::Client,
    url: &str,
    policy: &FetchPolicy,
) -> Result<String, FeedError> {
    let mut last_error = FeedError::Unknown("No fetch attempts were made".to_string());
    let mut all_timed_out = true;

    for attempt in 0..=policy.retries {
        if attempt > 0 {
            let backoff = policy.backoff_base * attempt;
            debug!("Retrying {} in {:?} (attempt {})", url, backoff, attempt + 1);
            sleep(backoff).await;
        }

        match timeout(policy.timeout, do_fetch(client, url)).await {
            Ok(Ok(body)) => return Ok(body),
            Ok(Err(e)) => {
                warn!("Fetch attempt {} for {} failed: {}", attempt + 1, url, e);
                all_timed_out = false;
                last_error = e;
            }
            Err(_) => {
                warn!(
                    "Fetch attempt {} for {} timed out after {:?}",
                    attempt + 1,
                    url,
                    policy.timeout
                );
                last_error = FeedError::TimeoutError(format!(
                    "No response from {} within {:?}",
                    url, policy.timeout
                ));
            }
        }
    }

    if all_timed_out {
        Err(FeedError::TimeoutError(format!(
            "All {} attempts for {} timed out",
            policy.retries + 1,
            url
        )))
    } else {
        Err(last_error)
    }
}

async fn do_fetch(client: &reqwest::Client, url: &str) -> Result<String, FeedError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(FeedError::NetworkError(format!(
            "Response was not ok: {} for {}",
            response.status(),
            url
        )));
    }
    Ok(response.text().await?)
}

/// Append a timestamp query parameter to defeat intermediate HTTP caches.
pub fn cache_busted_url(canonical: &str) -> Result<String, FeedError> {
    let mut url = Url::parse(canonical)
        .map_err(|e| FeedError::ConfigError(format!("Invalid feed URL '{}': {}", canonical, e)))?;
    let now = Utc::now().timestamp_millis();
    url.query_pairs_mut().append_pair("t", &now.to_string());
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_busting_appends_timestamp_param() {
        let busted = cache_busted_url("https://example.com/pub?gid=0&output=csv").unwrap();
        assert!(busted.starts_with("https://example.com/pub?gid=0&output=csv&t="));

        let busted = cache_busted_url("http://127.0.0.1:8080/feed.csv").unwrap();
        assert!(busted.starts_with("http://127.0.0.1:8080/feed.csv?t="));
    }

    fn quick_policy() -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(2),
            retries: 1,
            backoff_base: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn returns_body_on_first_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed.csv")
            .with_status(200)
            .with_body("Name,Fee\nA,100")
            .expect(1)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed.csv", server.url());
        let body = fetch_with_retry(&client, &url, &quick_policy()).await.unwrap();
        assert_eq!(body, "Name,Fee\nA,100");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/feed.csv")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/feed.csv")
            .with_status(200)
            .with_body("ok")
            .expect(1)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed.csv", server.url());
        let body = fetch_with_retry(&client, &url, &quick_policy()).await.unwrap();
        assert_eq!(body, "ok");
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_after_retries_is_a_network_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed.csv")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/feed.csv", server.url());
        let err = fetch_with_retry(&client, &url, &quick_policy()).await.unwrap_err();
        assert!(matches!(err, FeedError::NetworkError(_)), "got {:?}", err);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Connection refused fails fast, well inside the timeout
        let client = reqwest::Client::new();
        let err = fetch_with_retry(&client, "http://127.0.0.1:1/feed.csv", &quick_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::NetworkError(_)), "got {:?}", err);
    }
}
