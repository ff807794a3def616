//! Configuration management for jikimi
//!
//! Configuration is loaded from a TOML file or built from defaults, then
//! overridden by `JIKIMI_*` environment variables and validated.
//!
//! ```toml
//! [dispatch]
//! max_retries = 3
//! rpc_timeout_ms = 5000
//!
//! [topology]
//! segments = 64
//! metadata_mode = "transient"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::topology::{MetadataMode, ReactorConfig};
use crate::utils::retry::RetryConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value is out of range or inconsistent
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// The config file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`]
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command dispatch and retry
    pub dispatch: DispatchConfig,

    /// Segmentation and topology reaction
    pub topology: TopologyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Dispatch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff base delay in milliseconds
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,

    /// Backoff growth factor
    pub backoff_multiplier: f64,

    /// How long a remote member may take to reply, in milliseconds
    pub rpc_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            backoff_multiplier: retry.backoff_multiplier,
            rpc_timeout_ms: 5_000,
        }
    }
}

impl DispatchConfig {
    /// Retry policy wrapping each dispatch
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    /// Remote reply timeout
    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// Topology configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Number of keyspace segments
    pub segments: u32,

    /// Bound on the synchronous cancellation sweep, in milliseconds
    pub cancel_sweep_timeout_ms: u64,

    /// Bound on reactor shutdown, in milliseconds
    pub shutdown_timeout_ms: u64,

    /// How gained entries are rescheduled
    pub metadata_mode: MetadataMode,

    /// Entries processed between cooperative yields
    pub yield_every: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let reactor = ReactorConfig::default();
        Self {
            segments: 64,
            cancel_sweep_timeout_ms: reactor.cancel_sweep_timeout.as_millis() as u64,
            shutdown_timeout_ms: reactor.shutdown_timeout.as_millis() as u64,
            metadata_mode: reactor.metadata_mode,
            yield_every: reactor.yield_every,
        }
    }
}

impl TopologyConfig {
    /// Build a validated reactor configuration
    pub fn reactor_config(&self) -> Result<ReactorConfig, ConfigError> {
        ReactorConfig::builder()
            .cancel_sweep_timeout(Duration::from_millis(self.cancel_sweep_timeout_ms))
            .shutdown_timeout(Duration::from_millis(self.shutdown_timeout_ms))
            .metadata_mode(self.metadata_mode)
            .yield_every(self.yield_every)
            .build()
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Defaults overridden by `JIKIMI_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (or defaults), then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `JIKIMI_*` overrides on top of the current values
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        env_override("JIKIMI_MAX_RETRIES", &mut self.dispatch.max_retries)?;
        env_override("JIKIMI_BASE_DELAY_MS", &mut self.dispatch.base_delay_ms)?;
        env_override("JIKIMI_MAX_DELAY_MS", &mut self.dispatch.max_delay_ms)?;
        env_override("JIKIMI_BACKOFF_MULTIPLIER", &mut self.dispatch.backoff_multiplier)?;
        env_override("JIKIMI_RPC_TIMEOUT_MS", &mut self.dispatch.rpc_timeout_ms)?;

        env_override("JIKIMI_SEGMENTS", &mut self.topology.segments)?;
        env_override(
            "JIKIMI_CANCEL_SWEEP_TIMEOUT_MS",
            &mut self.topology.cancel_sweep_timeout_ms,
        )?;
        env_override("JIKIMI_SHUTDOWN_TIMEOUT_MS", &mut self.topology.shutdown_timeout_ms)?;
        env_override("JIKIMI_METADATA_MODE", &mut self.topology.metadata_mode)?;
        env_override("JIKIMI_YIELD_EVERY", &mut self.topology.yield_every)?;

        env_override("JIKIMI_LOG_LEVEL", &mut self.logging.level)?;
        env_override("JIKIMI_LOG_FORMAT", &mut self.logging.format)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dispatch = &self.dispatch;
        if dispatch.max_delay_ms < dispatch.base_delay_ms {
            return Err(ConfigError::invalid(
                "dispatch.max_delay_ms",
                "must not be below base_delay_ms",
            ));
        }
        if !dispatch.backoff_multiplier.is_finite() || dispatch.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "dispatch.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        if dispatch.rpc_timeout_ms == 0 {
            return Err(ConfigError::invalid("dispatch.rpc_timeout_ms", "must be greater than 0"));
        }

        if self.topology.segments == 0 {
            return Err(ConfigError::invalid("topology.segments", "must be greater than 0"));
        }
        self.topology.reactor_config()?;

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("unknown level '{}'", self.logging.level),
            ));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("expected text or json, got '{}'", self.logging.format),
            ));
        }

        Ok(())
    }
}

fn env_override<T: FromStr>(var: &str, target: &mut T) -> Result<(), ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(());
    };
    *target = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(var, format!("cannot parse '{raw}'")))?;
    Ok(())
}
