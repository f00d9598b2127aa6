use thiserror::Error;

/// Error taxonomy for the feed synchronization pipeline.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// Network/connectivity issues (transport failure or non-success status)
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// Every retry attempt exceeded the timeout
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Stored cache entry could not be deserialized
    #[error("Corrupt Cache Entry: {0}")]
    CorruptCacheError(String),

    /// Parsing errors for feed payloads
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Cache store read/write errors
    #[error("Cache Error: {0}")]
    CacheError(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Feed key not present in the registry
    #[error("Unknown Feed: {0}")]
    UnknownFeed(String),

    /// Unknown/unclassified errors
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::TimeoutError(format!("Request timed out: {}", err))
        } else {
            FeedError::NetworkError(format!("HTTP client error: {}", err))
        }
    }
}

impl FeedError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            FeedError::NetworkError(_) => true,
            FeedError::TimeoutError(_) => true,
            FeedError::CacheError(_) => true,
            FeedError::CorruptCacheError(_) => false, // Evicted locally, refetch instead
            FeedError::ParseError(_) => false,        // Data format issues aren't recoverable
            FeedError::ConfigError(_) => false,       // Config needs fixing
            FeedError::UnknownFeed(_) => false,       // Not registered, retry won't help
            FeedError::Unknown(_) => true,
        }
    }
}
