//! Unified error handling for the jikimi crate
//!
//! Each module owns its error type ([`DispatchError`], [`SchedulerError`],
//! [`ConfigError`], [`TopologyError`]); [`Error`] wraps them for callers that
//! cross module boundaries, such as node startup and the binary.
//!
//! ```rust
//! use jikimi::error::{Error, ErrorCategory};
//! use jikimi::scheduler::DispatchError;
//!
//! let err: Error = DispatchError::Cancelled.into();
//! assert_eq!(err.category(), ErrorCategory::Dispatch);
//! assert!(!err.is_recoverable());
//! ```

use std::io;
use thiserror::Error;

pub use crate::cluster::TopologyError;
pub use crate::config::ConfigError;
pub use crate::scheduler::{DispatchError, SchedulerError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Routing a command to its owner
    Dispatch,
    /// A local scheduler rejected the operation
    Execution,
    /// Invalid ownership assignment
    Topology,
    /// Configuration and validation
    Config,
    /// File and OS I/O
    Io,
    /// Encoding and decoding
    Serialization,
}

impl ErrorCategory {
    /// Label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Execution => "execution",
            Self::Topology => "topology",
            Self::Config => "config",
            Self::Io => "io",
            Self::Serialization => "serialization",
        }
    }
}

/// Unified error type for the jikimi crate
#[derive(Error, Debug)]
pub enum Error {
    /// Command dispatch failures
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Local scheduler failures
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Ownership assignment failures
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl Error {
    /// Check if retrying the failed operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Dispatch(e) => e.is_retryable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Topology(_) | Self::Config(_) | Self::Json(_) | Self::Toml(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Dispatch(DispatchError::Execution(_)) | Self::Scheduler(_) => ErrorCategory::Execution,
            Self::Dispatch(DispatchError::Codec(_)) => ErrorCategory::Serialization,
            Self::Dispatch(_) => ErrorCategory::Dispatch,
            Self::Topology(_) => ErrorCategory::Topology,
            Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) => ErrorCategory::Io,
            Self::Json(_) | Self::Toml(_) => ErrorCategory::Serialization,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
