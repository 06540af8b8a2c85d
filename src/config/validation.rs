//! Configuration validation
//!
//! Checks that can only fail on operator error are collected here so a bad
//! config aborts before any network or filesystem work starts.

use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Validates a parsed configuration
///
/// # Arguments
///
/// * `config` - The configuration to validate
///
/// # Returns
///
/// * `Ok(())` - Configuration is usable
/// * `Err(ConfigError)` - The first problem found
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    // Base URL must parse and be http(s)
    let base = Url::parse(&config.harvest.base_url)
        .map_err(|e| ConfigError::Validation(format!("harvest.base-url: {}", e)))?;
    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "harvest.base-url must be http(s), got scheme '{}'",
            base.scheme()
        )));
    }
    if base.host_str().is_none() {
        return Err(ConfigError::Validation(
            "harvest.base-url has no host".to_string(),
        ));
    }

    if config.harvest.max_concurrent_fetches == 0 {
        return Err(ConfigError::Validation(
            "harvest.max-concurrent-fetches must be at least 1".to_string(),
        ));
    }

    // Ranges are parsed eagerly so a typo fails at startup, not mid-crawl
    config.harvest.targets()?;
    config.harvest.pages()?;

    if config.fetch.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch.timeout-secs must be at least 1".to_string(),
        ));
    }

    if config.output.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output.directory must not be empty".to_string(),
        ));
    }

    if config.output.prefix.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output.prefix must not be empty".to_string(),
        ));
    }

    Ok(())
}
