pub mod settings;

pub use settings::Config;

use crate::error::FeedError;
use std::sync::Arc;

/// Loads and returns the application configuration as an `Arc<Config>`.
/// Centralizes dotenv loading and validation of critical settings.
pub fn load_config() -> Result<Arc<Config>, FeedError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = Config::from_env();

    if config.cache_namespace.is_empty() {
        return Err(FeedError::ConfigError(
            "CACHE_NAMESPACE cannot be empty".to_string(),
        ));
    }
    if config.fetch_timeout_ms == 0 {
        return Err(FeedError::ConfigError(
            "FETCH_TIMEOUT_MS cannot be zero".to_string(),
        ));
    }

    config.validate_and_log();

    Ok(Arc::new(config))
}
