//! Test fixtures for integration tests
//!
//! Provides an in-process cluster harness and helpers for building entries.

use std::sync::Arc;

use jikimi::cluster::{AffinityResolver, Member, PartitionTable, Segment, TableAffinity, TopologyCoordinator};
use jikimi::config::Config;
use jikimi::node::ClusterNode;
use jikimi::scheduler::local::{EntryStore, MemoryStore};
use jikimi::scheduler::Transport;
use jikimi::topology::SweepStatus;

/// Config with short delays suitable for tests
pub fn fast_config(segments: u32) -> Config {
    let mut config = Config::default();
    config.topology.segments = segments;
    config.dispatch.base_delay_ms = 5;
    config.dispatch.max_delay_ms = 20;
    config.dispatch.rpc_timeout_ms = 1_000;
    config
}

/// Ids `entry-0` .. `entry-{count-1}`
pub fn entry_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("entry-{i}")).collect()
}

/// In-process cluster sharing one entry store
pub struct TestCluster {
    pub config: Config,
    pub coordinator: TopologyCoordinator,
    pub transport: Arc<Transport>,
    pub store: Arc<MemoryStore<String, u64>>,
    pub nodes: Vec<ClusterNode<String, u64>>,
}

impl TestCluster {
    /// Start a cluster whose first member owns every segment
    ///
    /// The store is filled with `entries` ids whose metadata is their index.
    pub fn start(first: &str, entries: usize, config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        for (i, id) in entry_ids(entries).into_iter().enumerate() {
            store.insert(id, i as u64);
        }

        let table = Arc::new(PartitionTable::new(config.topology.segments, &[Member::new(first)]).unwrap());
        let mut cluster = Self {
            config,
            coordinator: TopologyCoordinator::new(table),
            transport: Transport::new(),
            store,
            nodes: Vec::new(),
        };
        cluster.join(first);
        cluster
    }

    /// Start a member; it owns nothing until the next rebalance
    pub fn join(&mut self, name: &str) -> &ClusterNode<String, u64> {
        let store: Arc<dyn EntryStore<String, u64>> = self.store.clone();
        let node = ClusterNode::start(
            Member::new(name),
            store,
            &self.coordinator,
            &self.transport,
            &self.config,
        )
        .unwrap();
        self.nodes.push(node);
        self.nodes.last().unwrap()
    }

    /// Node by member name
    pub fn node(&self, name: &str) -> &ClusterNode<String, u64> {
        self.nodes
            .iter()
            .find(|node| node.member().name() == name)
            .unwrap_or_else(|| panic!("no node named {name}"))
    }

    /// Install an explicit owner per segment
    pub async fn assign(&self, owners: &[&str]) -> u64 {
        let owners = owners.iter().map(|name| Member::new(*name)).collect();
        self.coordinator.rebalance(owners).await.unwrap()
    }

    /// Wait until every node's schedule sweep has finished
    pub async fn settle(&self) -> Vec<SweepStatus> {
        let mut statuses = Vec::new();
        for node in &self.nodes {
            if let Some(sweep) = node.reactor().current_sweep() {
                statuses.push(sweep.wait().await);
            }
        }
        statuses
    }

    /// Current owner of `id`
    pub fn owner_of(&self, id: &String) -> Member {
        TableAffinity::new(Arc::clone(self.coordinator.table())).owner_of(id)
    }

    /// Segment holding `id`
    pub fn segment_of(&self, id: &String) -> Segment {
        TableAffinity::new(Arc::clone(self.coordinator.table())).segment_of(id)
    }

    /// Stop every node
    pub async fn shutdown(self) {
        for node in &self.nodes {
            node.shutdown(&self.coordinator).await;
        }
    }
}
