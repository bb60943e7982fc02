//! Gateway configuration and upstream credentials
//!
//! Tuning knobs live in [`GatewayConfig`]; secrets for the two upstream
//! services are read from the environment, matching the deployment layout of
//! the hosted service this tool talks to.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::limiter::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECS};

/// Default maximum age of a cache entry before it is treated as stale
pub const DEFAULT_MAX_RECORD_AGE_HOURS: u64 = 24;

/// Default per-upstream request deadline in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),
}

/// Tuning parameters for the lookup gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum admitted lookups per identity within one window
    pub max_requests: usize,
    /// Rate-limit window length
    pub window: Duration,
    /// Age past which a cached record is treated as a miss
    pub max_record_age: Duration,
    /// Independent deadline applied to each upstream call
    pub upstream_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            max_record_age: Duration::from_secs(DEFAULT_MAX_RECORD_AGE_HOURS * 3600),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

/// Credentials for the DVLA Vehicle Enquiry Service
#[derive(Debug, Clone)]
pub struct VesCredentials {
    /// API key sent in the `x-api-key` header
    pub api_key: String,
}

impl VesCredentials {
    /// Loads the credentials from `VES_API_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: require_var("VES_API_KEY")?,
        })
    }
}

/// Credentials and endpoints for the DVSA MOT History API
#[derive(Debug, Clone)]
pub struct MotCredentials {
    /// Base URL of the trade API
    pub base_url: String,
    /// OAuth2 token endpoint
    pub token_url: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// API key sent in the `X-API-Key` header
    pub api_key: String,
}

impl MotCredentials {
    /// Loads the credentials from `MOT_API_URL`, `MOT_TOKEN_URL`,
    /// `MOT_CLIENT_ID`, `MOT_CLIENT_SECRET`, and `MOT_API_TOKEN`
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: require_var("MOT_API_URL")?,
            token_url: require_var("MOT_TOKEN_URL")?,
            client_id: require_var("MOT_CLIENT_ID")?,
            client_secret: require_var("MOT_CLIENT_SECRET")?,
            api_key: require_var("MOT_API_TOKEN")?,
        })
    }
}

/// Reads an environment variable, rejecting unset or empty values
fn require_var(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_limits() {
        let config = GatewayConfig::default();
        assert_eq!(config.max_requests, 10);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.max_record_age, Duration::from_secs(24 * 3600));
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_var_names_the_variable() {
        let err = require_var("REGWATCH_TEST_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("REGWATCH_TEST_UNSET_VAR"));
    }
}
