//! Configuration loading for the pricewatch client.
//!
//! `api_base_url` and `request_timeout_ms` are required. Logging and the
//! `[cache]` table fall back to the defaults of the cache engine.

use pricewatch_cache::{CachePolicy, DEFAULT_CACHE_TIME, DEFAULT_STALE_AFTER};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable consulted when `--config` is not given.
pub const CONFIG_ENV_VAR: &str = "PRICEWATCH_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// The `[cache]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    pub stale_after_ms: u64,
    pub cache_time_ms: u64,
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: millis(DEFAULT_STALE_AFTER),
            cache_time_ms: millis(DEFAULT_CACHE_TIME),
            max_entries: None,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy::new()
            .with_stale_after(Duration::from_millis(self.stale_after_ms))
            .with_cache_time(Duration::from_millis(self.cache_time_ms))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or PRICEWATCH_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Load from `explicit`, or from the path in `PRICEWATCH_CONFIG`.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        contents.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.stale_after_ms > self.cache.cache_time_ms {
            return Err(ConfigError::InvalidValue {
                field: "cache.stale_after_ms",
                reason: "must be <= cache.cache_time_ms".to_string(),
            });
        }
        if self.cache.max_entries == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_entries",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache.policy()
    }
}

impl FromStr for ClientConfig {
    type Err = ConfigError;

    /// Parse and validate TOML text.
    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}
