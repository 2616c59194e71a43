use crate::common::clock::Timestamp;
use crate::errors::Result;
use crate::leadership::{FailoverRecord, LeaderHandoff, LeaderLease};
use crate::membership::{ClusterNode, NodeHeartbeat, NodeRole, NodeStatus, Session};

/// Persisted cluster state other than the lock rows: `nodes`, `sessions`, `leader_lease`,
/// `leader_handoff` and `failover_records`.
///
/// Every method is one atomic step. `Err` means the store could not be reached.
pub trait ClusterStore: Send + Sync + 'static {
    /// Upserts the node row. A new row starts as an enabled `Online` follower; an existing row
    /// keeps its status, role and enabled flag.
    fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> Result<ClusterNode>;

    fn nodes(&self) -> Result<Vec<ClusterNode>>;

    /// Returns false when the node is unknown.
    fn save_node_state(&self, node_id: &str, status: NodeStatus, role: NodeRole) -> Result<bool>;

    /// Returns false when the node is unknown.
    fn set_node_enabled(&self, node_id: &str, enabled: bool) -> Result<bool>;

    fn refresh_session(&self, session: &Session) -> Result<()>;

    fn sessions(&self) -> Result<Vec<Session>>;

    fn leader_lease(&self) -> Result<Option<LeaderLease>>;

    /// Replaces the leader lease if the stored term (0 when absent) equals `expected_term`.
    fn replace_leader_lease(&self, expected_term: u64, lease: &LeaderLease) -> Result<bool>;

    /// Moves `expires_at` of the lease owned by `leader_node_id` in `term`.
    fn extend_leader_lease(
        &self,
        leader_node_id: &str,
        term: u64,
        expires_at: Timestamp,
    ) -> Result<bool>;

    fn leader_handoff(&self) -> Result<Option<LeaderHandoff>>;

    fn set_leader_handoff(&self, handoff: Option<LeaderHandoff>) -> Result<()>;

    /// Appends the record and returns the id the store assigned to it.
    fn append_failover(&self, record: FailoverRecord) -> Result<u64>;

    /// All records, oldest first.
    fn failover_records(&self) -> Result<Vec<FailoverRecord>>;
}
