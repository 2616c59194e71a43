use std::sync::Arc;
use std::time::{Duration, Instant};

use ha_coordinator::{HaConfiguration, HaNode, LockBackend, NodeConfiguration, NodeIdentity};
use ha_modules::{MemoryClusterStore, SystemClock};

pub struct CaseCluster<B: LockBackend> {
    pub nodes: Vec<HaNode<B, MemoryClusterStore, SystemClock>>,
    pub store: Arc<MemoryClusterStore>,
}

pub fn start_cluster<B: LockBackend>(
    node_ids: &[&str],
    backend: Arc<B>,
    config: HaConfiguration,
) -> CaseCluster<B> {
    let store = Arc::new(MemoryClusterStore::new());

    let nodes = node_ids
        .iter()
        .enumerate()
        .map(|(index, node_id)| {
            let node_config = NodeConfiguration {
                identity: NodeIdentity::new(node_id, &format!("127.0.0.1:{}", 52000 + index)),
                ha: config,
                lock_backend: backend.clone(),
                cluster_store: store.clone(),
                clock: SystemClock,
            };
            ha_coordinator::start_node(node_config).expect("node starts")
        })
        .collect();

    CaseCluster { nodes, store }
}

impl<B: LockBackend> CaseCluster<B> {
    /// Ids of the nodes that currently consider themselves leader.
    pub fn leaders(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.services().election.is_leader())
            .map(|node| node.node_id().to_string())
            .collect()
    }

    /// Waits until exactly one node leads and returns its id.
    pub fn wait_for_leader(&self, timeout: Duration) -> Option<String> {
        let started = Instant::now();
        while started.elapsed() < timeout {
            let leaders = self.leaders();
            if leaders.len() == 1 {
                return leaders.into_iter().next();
            }
            crate::steps::sleep_ms(10);
        }

        None
    }

    pub fn node(&self, node_id: &str) -> &HaNode<B, MemoryClusterStore, SystemClock> {
        self.nodes
            .iter()
            .find(|node| node.node_id() == node_id)
            .expect("node is part of the cluster")
    }

    pub fn remove(&mut self, node_id: &str) -> HaNode<B, MemoryClusterStore, SystemClock> {
        let position = self
            .nodes
            .iter()
            .position(|node| node.node_id() == node_id)
            .expect("node is part of the cluster");
        self.nodes.remove(position)
    }

    pub fn terminate(self) {
        for node in self.nodes {
            node.shutdown();
        }
    }
}
