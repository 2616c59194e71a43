use std::collections::HashMap;

use parking_lot::RwLock;

use ha_coordinator::{
    ClusterNode, ClusterStore, FailoverRecord, LeaderHandoff, LeaderLease, NodeHeartbeat,
    NodeRole, NodeStatus, Result, Session, Timestamp,
};

#[derive(Debug, Default)]
struct Tables {
    nodes: HashMap<String, ClusterNode>,
    sessions: HashMap<String, Session>,
    leader_lease: Option<LeaderLease>,
    leader_handoff: Option<LeaderHandoff>,
    failover_records: Vec<FailoverRecord>,
}

/// Cluster tables kept in memory. Shared by every node of an in-process cluster.
#[derive(Debug, Default)]
pub struct MemoryClusterStore {
    tables: RwLock<Tables>,
}

impl MemoryClusterStore {
    pub fn new() -> MemoryClusterStore {
        MemoryClusterStore::default()
    }
}

impl ClusterStore for MemoryClusterStore {
    fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> Result<ClusterNode> {
        let mut tables = self.tables.write();
        let node = tables
            .nodes
            .entry(heartbeat.node_id.clone())
            .or_insert_with(|| {
                info!("Node {} registered at {}", heartbeat.node_id, heartbeat.address);
                ClusterNode {
                    id: heartbeat.node_id.clone(),
                    address: heartbeat.address.clone(),
                    role: NodeRole::Follower,
                    status: NodeStatus::Online,
                    last_heartbeat: heartbeat.at,
                    joined_at: heartbeat.at,
                    metadata: HashMap::new(),
                    enabled: true,
                    weight: heartbeat.weight,
                }
            });

        node.address = heartbeat.address.clone();
        node.metadata = heartbeat.metadata.clone();
        node.weight = heartbeat.weight;
        node.last_heartbeat = heartbeat.at;
        Ok(node.clone())
    }

    fn nodes(&self) -> Result<Vec<ClusterNode>> {
        Ok(self.tables.read().nodes.values().cloned().collect())
    }

    fn save_node_state(&self, node_id: &str, status: NodeStatus, role: NodeRole) -> Result<bool> {
        match self.tables.write().nodes.get_mut(node_id) {
            Some(node) => {
                node.status = status;
                node.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_node_enabled(&self, node_id: &str, enabled: bool) -> Result<bool> {
        match self.tables.write().nodes.get_mut(node_id) {
            Some(node) => {
                node.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn refresh_session(&self, session: &Session) -> Result<()> {
        self.tables
            .write()
            .sessions
            .insert(session.node_id.clone(), session.clone());
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<Session>> {
        Ok(self.tables.read().sessions.values().cloned().collect())
    }

    fn leader_lease(&self) -> Result<Option<LeaderLease>> {
        Ok(self.tables.read().leader_lease.clone())
    }

    fn replace_leader_lease(&self, expected_term: u64, lease: &LeaderLease) -> Result<bool> {
        let mut tables = self.tables.write();
        let current_term = tables.leader_lease.as_ref().map_or(0, |current| current.term);
        if current_term != expected_term {
            debug!(
                "Leader lease CAS rejected: expected term {}, found {}",
                expected_term, current_term
            );
            return Ok(false);
        }

        tables.leader_lease = Some(lease.clone());
        Ok(true)
    }

    fn extend_leader_lease(
        &self,
        leader_node_id: &str,
        term: u64,
        expires_at: Timestamp,
    ) -> Result<bool> {
        match self.tables.write().leader_lease.as_mut() {
            Some(lease) if lease.leader_node_id == leader_node_id && lease.term == term => {
                lease.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn leader_handoff(&self) -> Result<Option<LeaderHandoff>> {
        Ok(self.tables.read().leader_handoff.clone())
    }

    fn set_leader_handoff(&self, handoff: Option<LeaderHandoff>) -> Result<()> {
        self.tables.write().leader_handoff = handoff;
        Ok(())
    }

    fn append_failover(&self, mut record: FailoverRecord) -> Result<u64> {
        let mut tables = self.tables.write();
        let id = tables.failover_records.last().map_or(1, |last| last.id + 1);
        record.id = id;
        tables.failover_records.push(record);
        Ok(id)
    }

    fn failover_records(&self) -> Result<Vec<FailoverRecord>> {
        Ok(self.tables.read().failover_records.clone())
    }
}
