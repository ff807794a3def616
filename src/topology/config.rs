//! Reactor configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::ConfigError;

/// How a gained entry is rescheduled on its new owner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    /// The scheduler looks up current state itself
    #[default]
    Transient,
    /// The sweep reads metadata from the entry store and passes it along
    Persistent,
}

impl fmt::Display for MetadataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Persistent => f.write_str("persistent"),
        }
    }
}

impl FromStr for MetadataMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transient" => Ok(Self::Transient),
            "persistent" => Ok(Self::Persistent),
            other => Err(ConfigError::invalid(
                "metadata_mode",
                format!("expected transient or persistent, got '{other}'"),
            )),
        }
    }
}

/// Configuration for a topology change reactor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactorConfig {
    /// Deadline for the synchronous cancellation sweep
    pub cancel_sweep_timeout: Duration,

    /// Bound on waiting for the sweep worker during close
    pub shutdown_timeout: Duration,

    /// How gained entries are rescheduled
    pub metadata_mode: MetadataMode,

    /// Entries processed between cooperative yields
    pub yield_every: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            cancel_sweep_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            metadata_mode: MetadataMode::Transient,
            yield_every: 64,
        }
    }
}

impl ReactorConfig {
    /// Create a new config builder
    pub fn builder() -> ReactorConfigBuilder {
        ReactorConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cancel_sweep_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "cancel_sweep_timeout",
                "must be greater than 0",
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::invalid("shutdown_timeout", "must be greater than 0"));
        }

        if self.yield_every == 0 {
            return Err(ConfigError::invalid("yield_every", "must be at least 1"));
        }

        Ok(())
    }
}

/// Builder for [`ReactorConfig`]
#[derive(Debug, Default)]
pub struct ReactorConfigBuilder {
    cancel_sweep_timeout: Option<Duration>,
    shutdown_timeout: Option<Duration>,
    metadata_mode: Option<MetadataMode>,
    yield_every: Option<usize>,
}

impl ReactorConfigBuilder {
    /// Set the cancellation sweep deadline
    pub fn cancel_sweep_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_sweep_timeout = Some(timeout);
        self
    }

    /// Set the shutdown bound
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Set the metadata mode
    pub fn metadata_mode(mut self, mode: MetadataMode) -> Self {
        self.metadata_mode = Some(mode);
        self
    }

    /// Set the cooperative yield interval
    pub fn yield_every(mut self, entries: usize) -> Self {
        self.yield_every = Some(entries);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ReactorConfig, ConfigError> {
        let defaults = ReactorConfig::default();
        let config = ReactorConfig {
            cancel_sweep_timeout: self.cancel_sweep_timeout.unwrap_or(defaults.cancel_sweep_timeout),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(defaults.shutdown_timeout),
            metadata_mode: self.metadata_mode.unwrap_or(defaults.metadata_mode),
            yield_every: self.yield_every.unwrap_or(defaults.yield_every),
        };

        config.validate()?;
        Ok(config)
    }
}
