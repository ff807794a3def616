//! Topology change events
//!
//! Every ownership change is announced twice to each member: once in the
//! [`ChangePhase::Pre`] phase, while the previous assignment is still
//! installed, and once in the [`ChangePhase::Post`] phase after the new
//! assignment is final. Each event carries the segments the receiving member
//! owned before and after the change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::member::Member;
use super::segment::{Segment, SegmentSet};
use crate::utils::{read_lock, write_lock};

// ============================================================================
// Events
// ============================================================================

/// Phase of a topology change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangePhase {
    /// Before the new ownership is installed
    Pre,
    /// After the new ownership is installed
    Post,
}

impl fmt::Display for ChangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre"),
            Self::Post => f.write_str("post"),
        }
    }
}

/// Ownership delta for the local member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyChangeEvent {
    /// Id of the topology being installed
    pub topology_id: u64,

    /// Which side of the change this notification is
    pub phase: ChangePhase,

    /// Segments owned locally before the change
    pub old_segments: SegmentSet,

    /// Segments owned locally after the change
    pub new_segments: SegmentSet,
}

impl TopologyChangeEvent {
    /// Create an event
    pub fn new(
        topology_id: u64,
        phase: ChangePhase,
        old_segments: SegmentSet,
        new_segments: SegmentSet,
    ) -> Self {
        Self {
            topology_id,
            phase,
            old_segments,
            new_segments,
        }
    }

    /// Segments no longer owned after the change
    pub fn lost(&self) -> SegmentSet {
        self.old_segments
            .difference(&self.new_segments)
            .copied()
            .collect()
    }

    /// Segments newly owned after the change
    pub fn gained(&self) -> SegmentSet {
        self.new_segments
            .difference(&self.old_segments)
            .copied()
            .collect()
    }

    /// Whether `segment` was local before the change
    pub fn is_local_before(&self, segment: Segment) -> bool {
        self.old_segments.contains(&segment)
    }

    /// Whether `segment` is local after the change
    pub fn is_local_after(&self, segment: Segment) -> bool {
        self.new_segments.contains(&segment)
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Receives topology change notifications
#[async_trait]
pub trait TopologyListener: Send + Sync {
    /// Handle one notification; the publisher awaits completion
    async fn topology_changed(&self, event: &TopologyChangeEvent);
}

/// Registration handle returned by [`TopologyEventSource::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-member source of topology notifications
///
/// Publishing awaits every registered listener in registration order, so a
/// listener's pre-phase work completes before the change proceeds.
pub struct TopologyEventSource {
    member: Member,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn TopologyListener>)>>,
}

impl TopologyEventSource {
    /// Create a source for `member`
    pub fn new(member: Member) -> Self {
        Self {
            member,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Member whose ownership this source reports
    pub fn member(&self) -> &Member {
        &self.member
    }

    /// Register a listener
    pub fn register(&self, listener: Arc<dyn TopologyListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        write_lock(&self.listeners).push((id, listener));
        tracing::debug!(member = %self.member, listener = %id, "topology listener registered");
        id
    }

    /// Remove a listener; returns false when it was not registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = write_lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        let removed = listeners.len() != before;
        if removed {
            tracing::debug!(member = %self.member, listener = %id, "topology listener removed");
        }
        removed
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        read_lock(&self.listeners).len()
    }

    /// Deliver `event` to every listener
    pub async fn publish(&self, event: &TopologyChangeEvent) {
        let listeners: Vec<_> = read_lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        tracing::trace!(
            member = %self.member,
            topology_id = event.topology_id,
            phase = %event.phase,
            listeners = listeners.len(),
            "publishing topology change"
        );

        for listener in listeners {
            listener.topology_changed(event).await;
        }
    }
}

impl fmt::Debug for TopologyEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyEventSource")
            .field("member", &self.member)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn set(segments: &[u32]) -> SegmentSet {
        segments.iter().map(|s| Segment(*s)).collect()
    }

    #[test]
    fn test_lost_and_gained() {
        let event = TopologyChangeEvent::new(2, ChangePhase::Pre, set(&[0, 1, 2]), set(&[1, 2, 3]));
        assert_eq!(event.lost(), set(&[0]));
        assert_eq!(event.gained(), set(&[3]));
        assert!(event.is_local_before(Segment(0)));
        assert!(!event.is_local_after(Segment(0)));
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u64, ChangePhase)>>,
    }

    #[async_trait]
    impl TopologyListener for Recorder {
        async fn topology_changed(&self, event: &TopologyChangeEvent) {
            self.seen.lock().unwrap().push((event.topology_id, event.phase));
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_listeners() {
        let source = TopologyEventSource::new(Member::new("a"));
        let recorder = Arc::new(Recorder::default());
        source.register(recorder.clone());

        source
            .publish(&TopologyChangeEvent::new(3, ChangePhase::Post, set(&[]), set(&[1])))
            .await;

        assert_eq!(*recorder.seen.lock().unwrap(), vec![(3, ChangePhase::Post)]);
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let source = TopologyEventSource::new(Member::new("a"));
        let recorder = Arc::new(Recorder::default());
        let id = source.register(recorder.clone());

        assert!(source.unregister(id));
        assert!(!source.unregister(id));
        assert_eq!(source.listener_count(), 0);

        source
            .publish(&TopologyChangeEvent::new(1, ChangePhase::Pre, set(&[1]), set(&[])))
            .await;
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
