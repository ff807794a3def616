//! A cluster member assembled from its parts
//!
//! [`ClusterNode`] wires one member's local scheduler, dispatcher, primary
//! owner scheduler and topology reactor together against a shared
//! [`TopologyCoordinator`] and [`Transport`]. Joining the ownership table is
//! left to the caller (see [`TopologyCoordinator::rebalance_to`]).

use std::sync::Arc;

use crate::cluster::{Member, TableAffinity, TopologyCoordinator};
use crate::config::Config;
use crate::error::Result;
use crate::scheduler::local::{EntryStore, MemoryScheduler};
use crate::scheduler::{ChannelDispatcher, Key, Metadata, PrimaryOwnerScheduler, Scheduler, Transport};
use crate::topology::TopologyChangeReactor;

/// One member of a process-local cluster
pub struct ClusterNode<I: Key, M: Metadata> {
    member: Member,
    local: Arc<MemoryScheduler<I, M>>,
    scheduler: PrimaryOwnerScheduler<I, M>,
    reactor: Arc<TopologyChangeReactor<I, M>>,
}

impl<I: Key, M: Metadata> ClusterNode<I, M> {
    /// Bind `member` on the transport and subscribe it to topology changes
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        member: Member,
        store: Arc<dyn EntryStore<I, M>>,
        coordinator: &TopologyCoordinator,
        transport: &Arc<Transport>,
        config: &Config,
    ) -> Result<Self> {
        let reactor_config = config.topology.reactor_config()?;
        let affinity = Arc::new(TableAffinity::new(Arc::clone(coordinator.table())));
        let local = Arc::new(MemoryScheduler::new(Arc::clone(&store)));

        let dispatcher = Arc::new(ChannelDispatcher::bind(
            member.clone(),
            local.clone(),
            affinity.clone(),
            Arc::clone(transport),
            config.dispatch.rpc_timeout(),
        ));
        let scheduler = PrimaryOwnerScheduler::new(affinity.clone(), dispatcher, config.dispatch.retry());

        let reactor = TopologyChangeReactor::start(
            member.clone(),
            local.clone(),
            store,
            Arc::new(affinity.segmenter()),
            coordinator.attach(&member),
            reactor_config,
        );

        tracing::info!(member = %member, "cluster node started");
        Ok(Self {
            member,
            local,
            scheduler,
            reactor,
        })
    }

    /// Member identity
    pub fn member(&self) -> &Member {
        &self.member
    }

    /// Cluster-wide scheduler routed through this member
    pub fn scheduler(&self) -> &PrimaryOwnerScheduler<I, M> {
        &self.scheduler
    }

    /// This member's local task holder
    pub fn local(&self) -> &Arc<MemoryScheduler<I, M>> {
        &self.local
    }

    /// This member's topology reactor
    pub fn reactor(&self) -> &Arc<TopologyChangeReactor<I, M>> {
        &self.reactor
    }

    /// Stop reacting, unbind from the transport and drop local tasks
    ///
    /// The member's segments are not reassigned; rebalance without it first
    /// for a graceful leave.
    pub async fn shutdown(&self, coordinator: &TopologyCoordinator) {
        self.reactor.close().await;
        self.scheduler.close();
        self.local.close();
        coordinator.detach(&self.member);
        tracing::info!(member = %self.member, "cluster node stopped");
    }
}
