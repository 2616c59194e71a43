use std::collections::HashMap;

use crate::common::clock::Timestamp;

mod manager;

pub use manager::ClusterMembership;

/// Weight used for failover candidate selection when none is configured.
pub const DEFAULT_NODE_WEIGHT: u32 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum NodeRole {
    #[display(fmt = "leader")]
    Leader,
    #[display(fmt = "follower")]
    Follower,
    #[display(fmt = "candidate")]
    Candidate,
}

/// Liveness derived from heartbeat age: `online -> suspect -> offline -> online`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum NodeStatus {
    #[display(fmt = "online")]
    Online,
    #[display(fmt = "suspect")]
    Suspect,
    #[display(fmt = "offline")]
    Offline,
}

/// One row of the `nodes` table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterNode {
    pub id: String,
    pub address: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub last_heartbeat: Timestamp,
    pub joined_at: Timestamp,
    pub metadata: HashMap<String, String>,
    pub enabled: bool,
    pub weight: u32,
}

/// What a node reports about itself on every heartbeat.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeHeartbeat {
    pub node_id: String,
    pub address: String,
    pub metadata: HashMap<String, String>,
    pub weight: u32,
    pub at: Timestamp,
}

/// Liveness handle of a node, refreshed by each heartbeat.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
#[display(fmt = "Session of {} until {}", node_id, expires_at)]
pub struct Session {
    pub node_id: String,
    pub token: String,
    pub expires_at: Timestamp,
}

/// Static description of the local node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeIdentity {
    pub node_id: String,
    pub address: String,
    pub weight: u32,
    pub metadata: HashMap<String, String>,
}

impl NodeIdentity {
    pub fn new(node_id: &str, address: &str) -> NodeIdentity {
        NodeIdentity {
            node_id: node_id.to_string(),
            address: address.to_string(),
            weight: DEFAULT_NODE_WEIGHT,
            metadata: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> NodeIdentity {
        self.weight = weight;
        self
    }
}

/// A status change observed by `ClusterMembership::recompute_statuses`.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
#[display(fmt = "Node {} {} -> {}", node_id, from, to)]
pub struct StatusTransition {
    pub node_id: String,
    pub from: NodeStatus,
    pub to: NodeStatus,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterStats {
    pub total: usize,
    pub online: usize,
    pub suspect: usize,
    pub offline: usize,
    pub disabled: usize,
    pub leader_id: Option<String>,
}
