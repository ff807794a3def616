//! Key affinity: which member is the primary owner of a key

use std::hash::Hash;
use std::sync::Arc;

use super::member::Member;
use super::partition::PartitionTable;
use super::segment::{HashSegmenter, Segment, SegmentResolver};

/// Resolves the primary owner of a key
///
/// Implementations must be backed by the live ownership map: two calls
/// without an intervening topology change return the same member.
pub trait AffinityResolver<I>: Send + Sync {
    /// Current primary owner of `id`
    fn owner_of(&self, id: &I) -> Member;
}

/// Affinity backed by a shared [`PartitionTable`]
#[derive(Debug, Clone)]
pub struct TableAffinity {
    table: Arc<PartitionTable>,
    segmenter: HashSegmenter,
}

impl TableAffinity {
    /// Create a resolver whose segmenter matches the table's segment count
    pub fn new(table: Arc<PartitionTable>) -> Self {
        let segmenter = HashSegmenter::new(table.segment_count());
        Self { table, segmenter }
    }

    /// Segmenter used to place keys
    pub fn segmenter(&self) -> HashSegmenter {
        self.segmenter
    }

    /// Segment of `id`
    pub fn segment_of<I: Hash>(&self, id: &I) -> Segment {
        self.segmenter.segment_of(id)
    }
}

impl<I: Hash> AffinityResolver<I> for TableAffinity {
    fn owner_of(&self, id: &I) -> Member {
        self.table.owner(self.segmenter.segment_of(id))
    }
}
