//! Topology coordinator
//!
//! Drives ownership changes for a process-local cluster: computes each
//! member's before/after segment sets, announces the pre phase, installs the
//! new assignment, then announces the post phase.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex as AsyncMutex;

use super::member::Member;
use super::partition::{owned_by, PartitionTable, TopologyError};
use super::topology::{ChangePhase, TopologyChangeEvent, TopologyEventSource};
use crate::utils::{read_lock, write_lock};

/// Installs assignments and notifies every attached member
#[derive(Debug)]
pub struct TopologyCoordinator {
    table: Arc<PartitionTable>,
    sources: RwLock<BTreeMap<Member, Arc<TopologyEventSource>>>,
    /// Held across pre, install and post so changes never interleave
    changes: AsyncMutex<()>,
}

impl TopologyCoordinator {
    /// Create a coordinator over `table`
    pub fn new(table: Arc<PartitionTable>) -> Self {
        Self {
            table,
            sources: RwLock::new(BTreeMap::new()),
            changes: AsyncMutex::new(()),
        }
    }

    /// Shared ownership table
    pub fn table(&self) -> &Arc<PartitionTable> {
        &self.table
    }

    /// Event source for `member`, created on first use
    pub fn attach(&self, member: &Member) -> Arc<TopologyEventSource> {
        let mut sources = write_lock(&self.sources);
        Arc::clone(
            sources
                .entry(member.clone())
                .or_insert_with(|| Arc::new(TopologyEventSource::new(member.clone()))),
        )
    }

    /// Stop notifying `member`
    pub fn detach(&self, member: &Member) -> bool {
        write_lock(&self.sources).remove(member).is_some()
    }

    /// Members currently attached
    pub fn attached(&self) -> Vec<Member> {
        read_lock(&self.sources).keys().cloned().collect()
    }

    /// Spread segments round-robin over `members` and install the result
    pub async fn rebalance_to(&self, members: &[Member]) -> Result<u64, TopologyError> {
        let owners = PartitionTable::balanced(self.table.segment_count(), members)?;
        self.rebalance(owners).await
    }

    /// Install `owners` (indexed by segment) as the new assignment
    ///
    /// Returns the id of the installed topology. Concurrent calls are applied
    /// one after another.
    pub async fn rebalance(&self, owners: Vec<Member>) -> Result<u64, TopologyError> {
        self.table.check(&owners)?;
        let _change = self.changes.lock().await;

        let previous = self.table.owners();
        let topology_id = self.table.topology_id() + 1;
        let sources: Vec<_> = read_lock(&self.sources)
            .iter()
            .map(|(member, source)| {
                (
                    Arc::clone(source),
                    owned_by(&previous, member),
                    owned_by(&owners, member),
                )
            })
            .collect();

        tracing::info!(
            topology_id,
            members = sources.len(),
            segments = owners.len(),
            "topology change starting"
        );

        join_all(sources.iter().map(|(source, old, new)| async move {
            let event = TopologyChangeEvent::new(topology_id, ChangePhase::Pre, old.clone(), new.clone());
            source.publish(&event).await;
        }))
        .await;

        let installed = self.table.install(owners)?;

        join_all(sources.iter().map(|(source, old, new)| async move {
            let event = TopologyChangeEvent::new(installed, ChangePhase::Post, old.clone(), new.clone());
            source.publish(&event).await;
        }))
        .await;

        tracing::info!(topology_id = installed, "topology change installed");
        Ok(installed)
    }
}
