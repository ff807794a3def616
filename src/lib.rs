//! jikimi - primary-owner task scheduling for partitioned clusters
//!
//! Keyed tasks (expiration timers and the like) must run on exactly the
//! member that owns the key's segment, and must follow the key when
//! ownership moves.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`cluster`] - members, segments, ownership table and topology events
//! - [`scheduler`] - commands, dispatch and the primary-owner scheduler
//! - [`topology`] - the reactor that moves tasks when ownership changes
//! - [`node`] - a member assembled from the parts above
//! - [`config`] - configuration management and settings
//! - [`metrics`] - Prometheus counters
//! - [`error`] - crate-wide error type
//! - [`utils`] - retry and lock helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jikimi::cluster::{Member, PartitionTable, TopologyCoordinator};
//! use jikimi::config::Config;
//! use jikimi::node::ClusterNode;
//! use jikimi::scheduler::{EntryStore, MemoryStore, Scheduler, Transport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let a = Member::new("a");
//!     let table = Arc::new(PartitionTable::new(config.topology.segments, &[a.clone()])?);
//!     let coordinator = TopologyCoordinator::new(table);
//!     let store = Arc::new(MemoryStore::<String, u64>::new());
//!     store.insert("session-1".to_string(), 30);
//!     let entries: Arc<dyn EntryStore<String, u64>> = store;
//!
//!     let node = ClusterNode::start(a, entries, &coordinator, &Transport::new(), &config)?;
//!     node.scheduler().schedule(&"session-1".to_string()).await;
//!     assert!(node.scheduler().contains(&"session-1".to_string()).await);
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod scheduler;
pub mod topology;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cluster::{AffinityResolver, Member, PartitionTable, TopologyCoordinator};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::node::ClusterNode;
    pub use crate::scheduler::{Command, CommandOutput, PrimaryOwnerScheduler, Scheduler};
    pub use crate::topology::{MetadataMode, TopologyChangeReactor};
}
