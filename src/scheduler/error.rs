//! Error types for the scheduler module

use std::fmt;

/// Result type for local scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Failures raised by a node's local scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The backing entry store could not be read
    StoreUnavailable {
        operation: String,
        reason: String,
    },

    /// The scheduler was closed
    Closed,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StoreUnavailable { operation, reason } => {
                write!(f, "Entry store unavailable during '{}': {}", operation, reason)
            }
            Self::Closed => write!(f, "Scheduler is closed"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create a store unavailable error
    pub fn store_unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
