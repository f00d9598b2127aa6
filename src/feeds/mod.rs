//! Static registry of remote data feeds.
//!
//! Every feed is a named, independently cached CSV endpoint (exchange rates
//! or a bank's fee table). The set of feeds is known at build time; URLs can
//! be overridden through configuration for testing against local servers.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Freshness class of a feed, driving its cache expiry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedClass {
    /// Exchange rates, refreshed about once a minute
    LiveRates,
    /// Bank fee tables, effectively static within a day
    FeeTable,
}

/// Wire format of a feed body. All built-in feeds publish CSV; JSON is kept
/// as a per-feed configuration choice for endpoints that wrap rows in a JSON
/// array-of-arrays envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedFormat {
    Csv,
    Json,
}

/// Configuration for a single feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub key: String,
    pub url: String,
    pub class: FeedClass,
    pub format: FeedFormat,
}

impl FeedConfig {
    pub fn new(key: &str, url: &str, class: FeedClass) -> Self {
        Self {
            key: key.to_string(),
            url: url.to_string(),
            class,
            format: FeedFormat::Csv,
        }
    }
}

const SHEET_BASE_MAIN: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vSNDdKNRmuS_lu66UUjPilT7lUNXogFk3ByljcyJHDRIUoPh5Lk_PCQ0dp7I5Td-YL55KWe1_WCeku5/pub";
const SHEET_BASE_EXTRA: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vQMEfkm2e1w-xg5P-iQGJNjGCECWkHW-qHKr-tDfm971K70C8874Grf66mMHow0kOkyskk4EaXPCng_/pub";

fn sheet_url(base: &str, gid: u64) -> String {
    format!("{}?gid={}&single=true&output=csv", base, gid)
}

static BUILTIN_FEEDS: Lazy<Vec<FeedConfig>> = Lazy::new(|| {
    vec![
        FeedConfig::new("exchange", &sheet_url(SHEET_BASE_MAIN, 0), FeedClass::LiveRates),
        FeedConfig::new("uab", &sheet_url(SHEET_BASE_MAIN, 245625530), FeedClass::FeeTable),
        FeedConfig::new("aya", &sheet_url(SHEET_BASE_MAIN, 1640510518), FeedClass::FeeTable),
        FeedConfig::new("cb", &sheet_url(SHEET_BASE_MAIN, 605862732), FeedClass::FeeTable),
        FeedConfig::new("kbz", &sheet_url(SHEET_BASE_MAIN, 1744659778), FeedClass::FeeTable),
        FeedConfig::new("mab", &sheet_url(SHEET_BASE_MAIN, 1796926669), FeedClass::FeeTable),
        FeedConfig::new("shein", &sheet_url(SHEET_BASE_EXTRA, 1852260511), FeedClass::FeeTable),
        FeedConfig::new("thaiph", &sheet_url(SHEET_BASE_EXTRA, 1899732459), FeedClass::FeeTable),
        FeedConfig::new("cashout", &sheet_url(SHEET_BASE_EXTRA, 2001411383), FeedClass::FeeTable),
    ]
});

/// Maps feed keys to their remote endpoints, with a reverse URL index so the
/// proxy can recognize intercepted requests.
#[derive(Debug, Clone)]
pub struct FeedRegistry {
    feeds: HashMap<String, FeedConfig>,
    live_rates_window: Duration,
    fee_table_window: Duration,
}

impl FeedRegistry {
    pub fn new(feeds: Vec<FeedConfig>) -> Self {
        let feeds = feeds.into_iter().map(|f| (f.key.clone(), f)).collect();
        Self {
            feeds,
            live_rates_window: Duration::from_secs(60),
            fee_table_window: Duration::from_secs(60 * 60),
        }
    }

    /// Override the canonical freshness windows.
    pub fn with_windows(mut self, live_rates: Duration, fee_table: Duration) -> Self {
        self.live_rates_window = live_rates;
        self.fee_table_window = fee_table;
        self
    }

    /// The built-in feed set: one live exchange-rate sheet plus the bank and
    /// service fee tables.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_FEEDS.clone())
    }

    pub fn get(&self, key: &str) -> Option<&FeedConfig> {
        self.feeds.get(key)
    }

    /// Reverse lookup: which feed does this request URL belong to?
    /// Cache-busting query parameters appended to the canonical URL still
    /// match, mirroring substring interception on the request path.
    pub fn match_url(&self, url: &str) -> Option<&FeedConfig> {
        self.feeds.values().find(|f| url.starts_with(&f.url))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedConfig> {
        self.feeds.values()
    }

    /// Keys of every fee-table feed, the set preloaded at startup.
    pub fn fee_table_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .feeds
            .values()
            .filter(|f| f.class == FeedClass::FeeTable)
            .map(|f| f.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Replace a feed's URL in place (env overrides, test servers).
    pub fn override_url(&mut self, key: &str, url: &str) {
        if let Some(feed) = self.feeds.get_mut(key) {
            feed.url = url.to_string();
        }
    }

    /// Freshness window for a feed. The canonical policy: live rates go
    /// stale after a minute, fee tables are trusted for an hour.
    pub fn freshness_window(&self, key: &str) -> Option<Duration> {
        self.get(key).map(|f| match f.class {
            FeedClass::LiveRates => self.live_rates_window,
            FeedClass::FeeTable => self.fee_table_window,
        })
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}
