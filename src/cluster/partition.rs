//! Segment ownership table
//!
//! Holds the current segment-to-member assignment. This is the in-memory
//! stand-in for the consistent-hash ownership map of the distributed cache:
//! every node of a process-local cluster shares one table, and the
//! [`TopologyCoordinator`](super::coordinator::TopologyCoordinator) is the only
//! writer.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

use super::member::Member;
use super::segment::{Segment, SegmentSet};
use crate::utils::{read_lock, write_lock};

/// Errors raised when building or changing the ownership table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// No member to own the segments
    #[error("topology has no members")]
    EmptyMembership,

    /// Assignment does not cover every segment exactly once
    #[error("assignment covers {actual} segments, expected {expected}")]
    SegmentCountMismatch { expected: u32, actual: usize },
}

/// Current owner of every segment
#[derive(Debug)]
pub struct PartitionTable {
    segments: u32,
    owners: RwLock<Vec<Member>>,
    topology_id: AtomicU64,
}

impl PartitionTable {
    /// Create a table with segments spread round-robin over `members`
    pub fn new(segments: u32, members: &[Member]) -> Result<Self, TopologyError> {
        let owners = Self::balanced(segments, members)?;
        Ok(Self {
            segments: owners.len() as u32,
            owners: RwLock::new(owners),
            topology_id: AtomicU64::new(1),
        })
    }

    /// Round-robin assignment of `segments` over `members`
    pub fn balanced(segments: u32, members: &[Member]) -> Result<Vec<Member>, TopologyError> {
        if members.is_empty() {
            return Err(TopologyError::EmptyMembership);
        }
        let segments = segments.max(1) as usize;
        Ok((0..segments)
            .map(|i| members[i % members.len()].clone())
            .collect())
    }

    /// Number of segments
    pub fn segment_count(&self) -> u32 {
        self.segments
    }

    /// Monotonic id of the installed topology
    pub fn topology_id(&self) -> u64 {
        self.topology_id.load(Ordering::Acquire)
    }

    /// Owner of `segment`
    pub fn owner(&self, segment: Segment) -> Member {
        let owners = read_lock(&self.owners);
        owners[segment.index() % owners.len()].clone()
    }

    /// Snapshot of the whole assignment, indexed by segment
    pub fn owners(&self) -> Vec<Member> {
        read_lock(&self.owners).clone()
    }

    /// Segments currently owned by `member`
    pub fn segments_owned_by(&self, member: &Member) -> SegmentSet {
        owned_by(&read_lock(&self.owners), member)
    }

    /// Members owning at least one segment
    pub fn members(&self) -> BTreeSet<Member> {
        read_lock(&self.owners).iter().cloned().collect()
    }

    /// Install a new assignment and bump the topology id
    pub(crate) fn install(&self, owners: Vec<Member>) -> Result<u64, TopologyError> {
        self.check(&owners)?;
        *write_lock(&self.owners) = owners;
        Ok(self.topology_id.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Validate an assignment against this table's shape
    pub fn check(&self, owners: &[Member]) -> Result<(), TopologyError> {
        if owners.is_empty() {
            return Err(TopologyError::EmptyMembership);
        }
        if owners.len() != self.segments as usize {
            return Err(TopologyError::SegmentCountMismatch {
                expected: self.segments,
                actual: owners.len(),
            });
        }
        Ok(())
    }
}

/// Segments of `owners` assigned to `member`
pub(crate) fn owned_by(owners: &[Member], member: &Member) -> SegmentSet {
    owners
        .iter()
        .enumerate()
        .filter(|(_, owner)| *owner == member)
        .map(|(i, _)| Segment(i as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(names: &[&str]) -> Vec<Member> {
        names.iter().map(|n| Member::new(*n)).collect()
    }

    #[test]
    fn test_balanced_assignment() {
        let table = PartitionTable::new(4, &members(&["a", "b"])).unwrap();
        assert_eq!(table.segment_count(), 4);
        assert_eq!(table.owner(Segment(0)), Member::new("a"));
        assert_eq!(table.owner(Segment(1)), Member::new("b"));
        assert_eq!(
            table.segments_owned_by(&Member::new("a")),
            [Segment(0), Segment(2)].into_iter().collect()
        );
    }

    #[test]
    fn test_empty_membership_rejected() {
        assert_eq!(
            PartitionTable::new(4, &[]).unwrap_err(),
            TopologyError::EmptyMembership
        );
    }

    #[test]
    fn test_install_bumps_topology_id() {
        let table = PartitionTable::new(2, &members(&["a"])).unwrap();
        let before = table.topology_id();
        let id = table.install(members(&["a", "b"])).unwrap();
        assert_eq!(id, before + 1);
        assert_eq!(table.owner(Segment(1)), Member::new("b"));
    }

    #[test]
    fn test_install_rejects_wrong_shape() {
        let table = PartitionTable::new(2, &members(&["a"])).unwrap();
        let err = table.install(members(&["a", "b", "c"])).unwrap_err();
        assert!(matches!(err, TopologyError::SegmentCountMismatch { expected: 2, actual: 3 }));
    }
}
