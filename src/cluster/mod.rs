//! Cluster model: members, segments, ownership and topology changes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  rebalance   ┌──────────────────┐
//! │ TopologyCoordinator  │─────────────▶│  PartitionTable  │
//! └──────────┬───────────┘   install    └────────┬─────────┘
//!            │ pre / post                        │ owner(segment)
//!            ▼                                   ▼
//!  ┌────────────────────┐              ┌──────────────────┐
//!  │ TopologyEventSource│ (per member) │  TableAffinity   │
//!  └────────────────────┘              └──────────────────┘
//! ```
//!
//! - [`member`] - node identity
//! - [`segment`] - segments and key-to-segment hashing
//! - [`partition`] - segment ownership table
//! - [`affinity`] - key-to-owner resolution
//! - [`topology`] - pre/post change events and listener registration
//! - [`coordinator`] - drives ownership changes for a process-local cluster

pub mod affinity;
pub mod coordinator;
pub mod member;
pub mod partition;
pub mod segment;
pub mod topology;

pub use affinity::{AffinityResolver, TableAffinity};
pub use coordinator::TopologyCoordinator;
pub use member::Member;
pub use partition::{PartitionTable, TopologyError};
pub use segment::{HashSegmenter, Segment, SegmentResolver, SegmentSet};
pub use topology::{ChangePhase, ListenerId, TopologyChangeEvent, TopologyEventSource, TopologyListener};
