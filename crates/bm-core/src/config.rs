//! Configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{CapturePrecedence, TabCloseScope};

/// Raw-content endpoint of the bypass dataset.
pub const DEFAULT_DATASET_URL: &str =
    "https://api.github.com/repos/ACK-J/CSP-B-Gone/contents/data.tsv?ref=main";

/// Storage key holding the dataset payload.
pub const DEFAULT_PAYLOAD_KEY: &str = "cspData";

/// Storage key holding the fetch timestamp (ms since epoch).
pub const DEFAULT_TIMESTAMP_KEY: &str = "lastFetchTimestamp";

/// 24 hours.
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub capture: CaptureConfig,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()
    }
}

/// Dataset cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dataset_url: String,
    /// Freshness window in seconds
    pub ttl_secs: u64,
    pub payload_key: String,
    pub timestamp_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            payload_key: DEFAULT_PAYLOAD_KEY.to_string(),
            timestamp_key: DEFAULT_TIMESTAMP_KEY.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_secs == 0 {
            return Err(Error::Config("ttl_secs must be greater than zero".to_string()));
        }
        if self.payload_key.is_empty() || self.timestamp_key.is_empty() {
            return Err(Error::Config("cache keys must not be empty".to_string()));
        }
        if self.payload_key == self.timestamp_key {
            return Err(Error::Config("payload_key and timestamp_key must differ".to_string()));
        }
        if !self.dataset_url.starts_with("http://") && !self.dataset_url.starts_with("https://") {
            return Err(Error::Config(format!("dataset_url is not an http(s) URL: {}", self.dataset_url)));
        }
        Ok(())
    }
}

/// Capture arbitration configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub precedence: CapturePrecedence,
    pub tab_close: TabCloseScope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.cache.payload_key, "cspData");
        assert_eq!(config.cache.timestamp_key, "lastFetchTimestamp");
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_json(
            r#"{"cache": {"ttl_secs": 60}, "capture": {"precedence": "header-authoritative", "tab_close": "all"}}"#,
        )
        .unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.dataset_url, DEFAULT_DATASET_URL);
        assert_eq!(config.capture.precedence, CapturePrecedence::HeaderAuthoritative);
        assert_eq!(config.capture.tab_close, TabCloseScope::All);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(Config::from_json(r#"{"cache": {"ttl_secs": 0}}"#), Err(Error::Config(_))));
        assert!(matches!(
            Config::from_json(r#"{"cache": {"payload_key": "k", "timestamp_key": "k"}}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::from_json("not json"), Err(Error::Serialization(_))));
    }
}
