use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::common::call_with_timeout;
use crate::common::clock::{self, Clock, Timestamp};
use crate::errors::{ErrorKind, HaError, Result};
use crate::membership::{
    ClusterNode, ClusterStats, NodeHeartbeat, NodeIdentity, NodeRole, NodeStatus, Session,
    StatusTransition,
};
use crate::node::configuration::HaConfiguration;
use crate::store::ClusterStore;

/// Heartbeats of the local node and the consolidated liveness view of the cluster.
///
/// The view is reloaded from the store on every status recompute. When the store cannot be read
/// the last known heartbeats keep aging locally.
pub struct ClusterMembership<S: ClusterStore, C: Clock> {
    identity: NodeIdentity,
    store: Arc<S>,
    clock: C,
    config: HaConfiguration,
    session_token: String,
    nodes: RwLock<HashMap<String, ClusterNode>>,
}

impl<S: ClusterStore, C: Clock> ClusterMembership<S, C> {
    pub fn new(
        identity: NodeIdentity,
        store: Arc<S>,
        clock: C,
        config: HaConfiguration,
    ) -> ClusterMembership<S, C> {
        let session_token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        ClusterMembership {
            identity,
            store,
            clock,
            config,
            session_token,
            nodes: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.identity.node_id
    }

    /// Publishes the heartbeat of the local node and refreshes its session.
    pub fn heartbeat(&self) -> Result<ClusterNode> {
        let now = self.clock.now();
        let heartbeat = NodeHeartbeat {
            node_id: self.identity.node_id.clone(),
            address: self.identity.address.clone(),
            metadata: self.identity.metadata.clone(),
            weight: self.identity.weight,
            at: now,
        };

        let mut node = self.store_call("record_heartbeat", move |s| {
            s.record_heartbeat(&heartbeat)
        })?;

        let session = Session {
            node_id: self.identity.node_id.clone(),
            token: self.session_token.clone(),
            expires_at: clock::add(now, self.config.offline_threshold),
        };
        if let Err(err) = self.store_call("refresh_session", move |s| s.refresh_session(&session)) {
            warn!("Node {} Cannot refresh session: {}", self.identity.node_id, err);
        }

        if node.enabled && node.status == NodeStatus::Offline {
            info!("Node {} Rejoined the cluster as follower", node.id);
            node.status = NodeStatus::Online;
            node.role = NodeRole::Follower;
            self.persist_state(&node);
        }

        trace!("Node {} Heartbeat at {}", node.id, now);
        self.nodes.write().insert(node.id.clone(), node.clone());
        Ok(node)
    }

    /// Derives every node's status from its heartbeat age and persists the changes.
    pub fn recompute_statuses(&self) -> Vec<StatusTransition> {
        let loaded = match self.store_call("nodes", |s| s.nodes()) {
            Ok(nodes) => Some(nodes),
            Err(err) => {
                warn!(
                    "Node {} Cannot load cluster nodes, using the local view: {}",
                    self.identity.node_id, err
                );
                None
            }
        };

        let now = self.clock.now();
        let mut transitions = Vec::new();
        let mut changed = Vec::new();
        {
            let mut nodes = self.nodes.write();
            let previous: HashMap<String, NodeStatus> = nodes
                .values()
                .map(|node| (node.id.clone(), node.status))
                .collect();
            if let Some(loaded) = loaded {
                *nodes = loaded
                    .into_iter()
                    .map(|node| (node.id.clone(), node))
                    .collect();
            }

            for node in nodes.values_mut() {
                let stored = node.status;
                let status = self.derive_status(node, now);
                if status != stored {
                    node.status = status;
                    if status == NodeStatus::Offline || stored == NodeStatus::Offline {
                        node.role = NodeRole::Follower;
                    }
                    changed.push(node.clone());
                }

                let before = previous.get(&node.id).copied().unwrap_or(stored);
                if status != before {
                    let transition = StatusTransition {
                        node_id: node.id.clone(),
                        from: before,
                        to: status,
                    };
                    info!("Node {} Observed: {}", self.identity.node_id, transition);
                    transitions.push(transition);
                }
            }
        }

        for node in changed.iter() {
            self.persist_state(node);
        }

        transitions
    }

    pub fn node(&self, node_id: &str) -> Option<ClusterNode> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Local view of the cluster, ordered by node id.
    pub fn nodes(&self) -> Vec<ClusterNode> {
        let mut nodes: Vec<ClusterNode> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Sessions that have not expired yet.
    pub fn sessions(&self) -> Result<Vec<Session>> {
        let now = self.clock.now();
        let mut sessions = self.store_call("sessions", |s| s.sessions())?;
        sessions.retain(|session| session.expires_at > now);
        sessions.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(sessions)
    }

    /// Takes the node out of election and task scheduling and marks it offline at once.
    pub fn disable_node(&self, node_id: &str) -> Result<ClusterNode> {
        self.set_enabled(node_id, false)?;

        let mut node = self.node(node_id).ok_or_else(|| not_found(node_id))?;
        node.enabled = false;
        node.status = NodeStatus::Offline;
        self.persist_state(&node);
        self.nodes.write().insert(node.id.clone(), node.clone());

        info!("Node {} Disabled node {}", self.identity.node_id, node_id);
        Ok(node)
    }

    /// Lets the next recompute derive the node status from its heartbeat age again.
    pub fn enable_node(&self, node_id: &str) -> Result<ClusterNode> {
        self.set_enabled(node_id, true)?;

        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(node_id).ok_or_else(|| not_found(node_id))?;
        node.enabled = true;

        info!("Node {} Enabled node {}", self.identity.node_id, node_id);
        Ok(node.clone())
    }

    /// Enabled and not offline.
    pub fn is_eligible(&self, node_id: &str) -> bool {
        match self.nodes.read().get(node_id) {
            Some(node) => node.enabled && node.status != NodeStatus::Offline,
            None => false,
        }
    }

    /// Records who leads the cluster. Only the local node's own row is persisted.
    pub fn set_leader(&self, leader_id: Option<&str>) {
        let own_change = {
            let mut nodes = self.nodes.write();
            let mut own_change = None;
            for node in nodes.values_mut() {
                let role = if Some(node.id.as_str()) == leader_id {
                    NodeRole::Leader
                } else if node.role == NodeRole::Leader || node.id == self.identity.node_id {
                    NodeRole::Follower
                } else {
                    node.role
                };

                if role != node.role {
                    node.role = role;
                    if node.id == self.identity.node_id {
                        own_change = Some(node.clone());
                    }
                }
            }
            own_change
        };

        if let Some(node) = own_change {
            info!("Node {} Role changed to {}", node.id, node.role);
            self.persist_state(&node);
        }
    }

    pub fn set_candidate(&self) {
        let node = {
            let mut nodes = self.nodes.write();
            match nodes.get_mut(&self.identity.node_id) {
                Some(node) if node.role != NodeRole::Candidate => {
                    node.role = NodeRole::Candidate;
                    node.clone()
                }
                _ => return,
            }
        };

        trace!("Node {} Became candidate", node.id);
        self.persist_state(&node);
    }

    /// Online, enabled node with the highest weight. Ties go to the smallest id.
    pub fn select_failover_candidate(&self, exclude: Option<&str>) -> Option<ClusterNode> {
        let nodes = self.nodes.read();
        nodes
            .values()
            .filter(|node| Some(node.id.as_str()) != exclude)
            .filter(|node| node.enabled && node.status == NodeStatus::Online)
            .max_by(|a, b| a.weight.cmp(&b.weight).then_with(|| b.id.cmp(&a.id)))
            .cloned()
    }

    pub fn stats(&self) -> ClusterStats {
        let nodes = self.nodes.read();
        let mut stats = ClusterStats::default();
        for node in nodes.values() {
            stats.total += 1;
            match node.status {
                NodeStatus::Online => stats.online += 1,
                NodeStatus::Suspect => stats.suspect += 1,
                NodeStatus::Offline => stats.offline += 1,
            }
            if !node.enabled {
                stats.disabled += 1;
            }
            if node.role == NodeRole::Leader && node.status != NodeStatus::Offline {
                stats.leader_id = Some(node.id.clone());
            }
        }
        stats
    }

    fn derive_status(&self, node: &ClusterNode, now: Timestamp) -> NodeStatus {
        if !node.enabled {
            return NodeStatus::Offline;
        }

        let age = clock::elapsed(node.last_heartbeat, now);
        if age >= self.config.offline_threshold {
            NodeStatus::Offline
        } else if age >= self.config.suspect_after() {
            NodeStatus::Suspect
        } else {
            NodeStatus::Online
        }
    }

    fn set_enabled(&self, node_id: &str, enabled: bool) -> Result<()> {
        let id = node_id.to_string();
        let found = self.store_call("set_node_enabled", move |s| {
            s.set_node_enabled(&id, enabled)
        })?;

        if !found {
            return Err(not_found(node_id));
        }
        Ok(())
    }

    fn persist_state(&self, node: &ClusterNode) {
        let (id, status, role) = (node.id.clone(), node.status, node.role);
        if let Err(err) = self.store_call("save_node_state", move |s| {
            s.save_node_state(&id, status, role)
        }) {
            warn!(
                "Node {} Cannot persist state of node {}: {}",
                self.identity.node_id, node.id, err
            );
        }
    }

    fn store_call<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        call_with_timeout(&self.store, self.config.backend_timeout, operation, call)
    }
}

fn not_found(node_id: &str) -> HaError {
    HaError::new(
        ErrorKind::NodeNotFound,
        format!("Node {} is not registered", node_id),
        String::new(),
    )
}
