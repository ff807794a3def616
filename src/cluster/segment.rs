//! Segment model and key-to-segment resolution
//!
//! The keyspace is split into a fixed number of segments. Ownership of a key
//! reduces to ownership of `hash(key) mod segment_count`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A discrete partition unit of the keyspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Segment(pub u32);

impl Segment {
    /// Index into a per-segment table
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered set of segments
pub type SegmentSet = BTreeSet<Segment>;

/// Maps a key to the segment that holds it
pub trait SegmentResolver<I>: Send + Sync {
    /// Segment of `id`; always below [`segment_count`](Self::segment_count)
    fn segment_of(&self, id: &I) -> Segment;

    /// Number of segments in the keyspace
    fn segment_count(&self) -> u32;
}

/// Hash-based segment resolver
///
/// Keys are fed through their `Hash` impl into SHA-256, so every node with
/// the same segment count places a key in the same segment regardless of the
/// process-local hasher seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSegmenter {
    count: u32,
}

impl HashSegmenter {
    /// Create a resolver for `count` segments (at least one)
    pub fn new(count: u32) -> Self {
        Self {
            count: count.max(1),
        }
    }
}

impl<I: Hash> SegmentResolver<I> for HashSegmenter {
    fn segment_of(&self, id: &I) -> Segment {
        let mut hasher = DigestHasher(Sha256::new());
        id.hash(&mut hasher);
        Segment((hasher.finish() % u64::from(self.count)) as u32)
    }

    fn segment_count(&self) -> u32 {
        self.count
    }
}

/// Adapts a SHA-256 digest to `std::hash::Hasher`
struct DigestHasher(Sha256);

impl Hasher for DigestHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    fn finish(&self) -> u64 {
        let digest = self.0.clone().finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head)
    }
}
