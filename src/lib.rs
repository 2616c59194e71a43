//! Coordination layer that lets several control-plane nodes run as one fault-tolerant cluster:
//! node heartbeats, single-leader election, named distributed locks and per-task exclusion.
//!
//! Storage is pluggable through `LockBackend` and `ClusterStore`.

#![warn(missing_debug_implementations, unsafe_code)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate crossbeam_channel;
#[macro_use]
extern crate derive_more;

mod admin;
mod common;
mod errors;
mod leadership;
mod lock;
mod membership;
mod node;
mod store;
mod task_ha;
mod workers;

#[cfg(test)]
mod test_support;

pub use admin::ClusterAdministrator;
pub use common::clock::{Clock, Timestamp};
pub use errors::{new_err, ErrorKind, HaError, Result};
pub use leadership::{
    FailoverReason, FailoverRecord, LeaderElectionService, LeaderHandoff, LeaderLease, LEADER_KEY,
};
pub use lock::backend::LockBackend;
pub use lock::service::DistributedLockService;
pub use lock::{FencingToken, Lease, LeaseInfo, LeaseOutcome, LockRecord, RenewalPolicy};
pub use membership::{
    ClusterMembership, ClusterNode, ClusterStats, NodeHeartbeat, NodeIdentity, NodeRole,
    NodeStatus, Session, StatusTransition, DEFAULT_NODE_WEIGHT,
};
pub use node::configuration::{HaConfiguration, NodeConfiguration};
pub use node::{HaNode, NodeServices};
pub use store::ClusterStore;
pub use task_ha::{task_lock_key, TaskGrant, TaskHaManager, TaskRun, TASK_KEY_PREFIX};

/// Validates the configuration, registers the node and starts its background workers.
pub fn start_node<B, S, C>(node_config: NodeConfiguration<B, S, C>) -> Result<HaNode<B, S, C>>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    node::start(node_config)
}
