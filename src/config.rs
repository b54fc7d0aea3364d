//! Configuration file parser for the collector (`collector.toml` by default).
//!
//! A missing or empty file yields `Config::default()`, which has no sources
//! and therefore fails [`Config::validate`]. Unknown keys are accepted by
//! serde but logged as warnings since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::collector::Source;
use crate::util::{validate_sink_url, validate_source_url};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No news sources configured")]
    NoSources,

    #[error("Invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },

    #[error("Invalid sink URL: {0}")]
    InvalidSink(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level collector configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between the end of one cycle and the start of the next.
    pub collection_interval_seconds: u64,

    /// Timeout for each source fetch.
    pub fetch_timeout_seconds: u64,

    /// Timeout for each item forwarded to the sink.
    pub forward_timeout_seconds: u64,

    /// Endpoint that receives normalized articles as JSON.
    pub sink_url: String,

    pub user_agent: String,

    pub max_redirects: usize,

    /// Capacity of the recently-seen guid cache. 0 disables suppression, so
    /// every cycle forwards every item still present in a feed.
    pub dedupe_capacity: usize,

    /// Sources in crawl order.
    pub sources: Vec<Source>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_interval_seconds: 60,
            fetch_timeout_seconds: 30,
            forward_timeout_seconds: 10,
            sink_url: "http://localhost:8080/news/add".to_string(),
            user_agent: "NewsAggregator/1.0 (RSS Reader)".to_string(),
            max_redirects: 5,
            dedupe_capacity: 0,
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "collection_interval_seconds",
        "fetch_timeout_seconds",
        "forward_timeout_seconds",
        "sink_url",
        "user_agent",
        "max_redirects",
        "dedupe_capacity",
        "sources",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// Loading does not validate; call [`Config::validate`] before use.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = Self::read_capped(path)? else {
            tracing::debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let table: toml::Table = content.parse()?;
        table
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .for_each(|key| tracing::warn!(key = %key, "Unknown key in config file, ignoring"));

        let config: Config = toml::Value::Table(table).try_into()?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            interval_secs = config.collection_interval_seconds,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reads `path` unless it exceeds [`Config::MAX_FILE_SIZE`]. `Ok(None)`
    /// when the file does not exist.
    fn read_capped(path: &Path) -> Result<Option<String>, ConfigError> {
        let not_found = |e: &std::io::Error| e.kind() == std::io::ErrorKind::NotFound;

        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if not_found(&e) => return Ok(None),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        if size > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                size,
                Self::MAX_FILE_SIZE
            )));
        }

        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if not_found(&e) => Ok(None),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Rejects configurations the collector cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::InvalidSource {
                    name: source.url.clone(),
                    reason: "name is empty".to_string(),
                });
            }
            validate_source_url(&source.url).map_err(|e| ConfigError::InvalidSource {
                name: source.name.clone(),
                reason: e.to_string(),
            })?;
        }

        validate_sink_url(&self.sink_url).map_err(|e| ConfigError::InvalidSink(e.to_string()))?;

        // A zero interval turns the loop into a busy re-crawl, and a zero
        // timeout fails every request before it is sent.
        for (key, value) in [
            ("collection_interval_seconds", self.collection_interval_seconds),
            ("fetch_timeout_seconds", self.fetch_timeout_seconds),
            ("forward_timeout_seconds", self.forward_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(key));
            }
        }
        Ok(())
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_seconds)
    }
}

// ============================================================================
// Tests
// ============================================================================
