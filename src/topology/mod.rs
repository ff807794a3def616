//! Reaction to segment ownership changes
//!
//! - [`config`] - reactor settings and metadata mode
//! - [`sweep`] - cancellation and schedule sweeps, sweep handles
//! - [`reactor`] - the per-member listener driving the sweeps

pub mod config;
pub mod reactor;
pub mod sweep;

pub use config::{MetadataMode, ReactorConfig, ReactorConfigBuilder};
pub use reactor::TopologyChangeReactor;
pub use sweep::{SweepHandle, SweepReport, SweepStatus};
