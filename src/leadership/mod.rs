use std::sync::Arc;
use std::time::Duration;

use crate::common::call_with_timeout;
use crate::common::clock::Timestamp;
use crate::errors::Result;
use crate::store::ClusterStore;

mod election;

pub use election::{LeaderElectionService, LEADER_KEY};

/// The single `leader_lease` row. `term` grows by one on every successful election.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
#[display(fmt = "Leader {} (term {}) until {}", leader_node_id, term, expires_at)]
pub struct LeaderLease {
    pub leader_node_id: String,
    pub term: u64,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Asks every node except `target_node_id` to abstain from campaigning until `expires_at`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeaderHandoff {
    pub target_node_id: String,
    pub expires_at: Timestamp,
}

impl LeaderHandoff {
    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum FailoverReason {
    #[display(fmt = "election")]
    Election,
    #[display(fmt = "lost-renewal")]
    LostRenewal,
    #[display(fmt = "forced")]
    Forced,
    #[display(fmt = "resigned")]
    Resigned,
    #[display(fmt = "disabled")]
    Disabled,
    #[display(fmt = "lock-reclaimed")]
    LockReclaimed,
    #[display(fmt = "failover")]
    Failover,
}

/// Append-only audit entry of a leadership change or a forced lock reclamation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailoverRecord {
    /// Assigned by the store.
    pub id: u64,
    /// The failed, resigning or triggering node.
    pub node_id: String,
    pub previous_leader: Option<String>,
    pub new_leader: Option<String>,
    pub reason: FailoverReason,
    /// Lock key for `lock-reclaimed` records.
    pub lock_key: Option<String>,
    pub timestamp: Timestamp,
}

impl FailoverRecord {
    pub fn new(node_id: &str, reason: FailoverReason, timestamp: Timestamp) -> FailoverRecord {
        FailoverRecord {
            id: 0,
            node_id: node_id.to_string(),
            previous_leader: None,
            new_leader: None,
            reason,
            lock_key: None,
            timestamp,
        }
    }
}

/// Appends to the audit log. A failed append is logged and otherwise ignored.
pub(crate) fn record_failover<S: ClusterStore>(
    store: &Arc<S>,
    timeout: Duration,
    record: FailoverRecord,
) -> Option<u64> {
    let reason = record.reason;
    let node_id = record.node_id.clone();
    let result: Result<u64> =
        call_with_timeout(store, timeout, "append_failover", move |s| s.append_failover(record));

    match result {
        Ok(id) => {
            info!("Node {} Failover record #{} ({})", node_id, id, reason);
            Some(id)
        }
        Err(err) => {
            warn!("Node {} Cannot record failover ({}): {}", node_id, reason, err);
            None
        }
    }
}
