//! Configuration management
//!
//! TOML configuration with `KUBA_COMPOSE_*` environment variable overrides and
//! defaults for every field, so an empty file is a valid configuration.
//!
//! ```toml
//! [engine]
//! max_concurrent_queries = 8
//! query_timeout_ms = 30000
//! default_step_secs = 60
//! max_points_per_series = 10000
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Query engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Maximum builder queries evaluated against the store at once
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Deadline for a whole request, in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Step used when neither the query nor the request sets one
    #[serde(default = "default_step_secs")]
    pub default_step_secs: u64,

    /// Largest series a store may return for one key
    #[serde(default = "default_max_points_per_series")]
    pub max_points_per_series: usize,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_max_concurrent_queries() -> usize { 8 }
fn default_query_timeout_ms() -> u64 { 30_000 }
fn default_step_secs() -> u64 { 60 }
fn default_max_points_per_series() -> usize { 10_000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            query_timeout_ms: default_query_timeout_ms(),
            default_step_secs: default_step_secs(),
            max_points_per_series: default_max_points_per_series(),
        }
    }
}

impl EngineConfig {
    /// Request deadline
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Set the fan-out limit
    pub fn with_max_concurrent_queries(mut self, limit: usize) -> Self {
        self.max_concurrent_queries = limit;
        self
    }

    /// Set the request deadline
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the fallback step
    pub fn with_default_step_secs(mut self, seconds: u64) -> Self {
        self.default_step_secs = seconds;
        self
    }

    /// Set the per-series point limit
    pub fn with_max_points_per_series(mut self, limit: usize) -> Self {
        self.max_points_per_series = limit;
        self
    }

    /// Validate engine settings
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_queries == 0 {
            return Err(Error::Configuration(
                "max_concurrent_queries must be > 0".to_string(),
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err(Error::Configuration("query_timeout_ms must be > 0".to_string()));
        }
        if self.default_step_secs == 0 {
            return Err(Error::Configuration("default_step_secs must be > 0".to_string()));
        }
        if self.max_points_per_series == 0 {
            return Err(Error::Configuration(
                "max_points_per_series must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Engine
        if let Some(v) = env_parse("KUBA_COMPOSE_MAX_CONCURRENT_QUERIES") {
            self.engine.max_concurrent_queries = v;
        }
        if let Some(v) = env_parse("KUBA_COMPOSE_QUERY_TIMEOUT_MS") {
            self.engine.query_timeout_ms = v;
        }
        if let Some(v) = env_parse("KUBA_COMPOSE_DEFAULT_STEP_SECS") {
            self.engine.default_step_secs = v;
        }
        if let Some(v) = env_parse("KUBA_COMPOSE_MAX_POINTS_PER_SERIES") {
            self.engine.max_points_per_series = v;
        }

        // Logging
        if let Ok(level) = std::env::var("KUBA_COMPOSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = env_parse("KUBA_COMPOSE_LOG_JSON") {
            self.logging.json = v;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(Error::Configuration("Log level cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
