//! In-process admin surface of a node. Each action maps onto one core operation.

use std::sync::Arc;

use crate::common::call_with_timeout;
use crate::common::clock::Clock;
use crate::errors::{new_err, ErrorKind, HaError, Result};
use crate::leadership::{record_failover, FailoverReason, FailoverRecord, LeaderElectionService, LeaderLease};
use crate::lock::backend::LockBackend;
use crate::lock::service::DistributedLockService;
use crate::lock::LockRecord;
use crate::membership::{ClusterMembership, ClusterNode, ClusterStats, Session};
use crate::node::configuration::HaConfiguration;
use crate::store::ClusterStore;
use crate::task_ha::TaskHaManager;

pub struct ClusterAdministrator<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub(crate) locks: Arc<DistributedLockService<B, C>>,
    pub(crate) membership: Arc<ClusterMembership<S, C>>,
    pub(crate) election: Arc<LeaderElectionService<B, S, C>>,
    pub(crate) tasks: Arc<TaskHaManager<B, S, C>>,
    pub(crate) store: Arc<S>,
    pub(crate) clock: C,
    pub(crate) config: HaConfiguration,
}

impl<B, S, C> ClusterAdministrator<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub fn list_nodes(&self) -> Vec<ClusterNode> {
        self.membership.nodes()
    }

    pub fn current_leader(&self) -> Result<Option<LeaderLease>> {
        self.election.current_leader()
    }

    pub fn list_locks(&self) -> Result<Vec<LockRecord>> {
        let mut locks = self.locks.locks()?;
        locks.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(locks)
    }

    pub fn sessions(&self) -> Result<Vec<Session>> {
        self.membership.sessions()
    }

    /// Audit log, newest first.
    pub fn failover_history(&self) -> Result<Vec<FailoverRecord>> {
        let mut records = call_with_timeout(
            &self.store,
            self.config.backend_timeout,
            "failover_records",
            |s| s.failover_records(),
        )?;
        records.reverse();
        Ok(records)
    }

    pub fn running_tasks(&self) -> Vec<String> {
        self.tasks.running_tasks()
    }

    pub fn stats(&self) -> ClusterStats {
        self.membership.stats()
    }

    pub fn enable_node(&self, node_id: &str) -> Result<ClusterNode> {
        self.membership.enable_node(node_id)
    }

    pub fn disable_node(&self, node_id: &str) -> Result<ClusterNode> {
        self.membership.disable_node(node_id)
    }

    pub fn resign_leader(&self) -> Result<()> {
        match self.election.resign() {
            Err(err) if err.kind() == ErrorKind::NotLeader => {
                Err(err.with_holder(self.election.leader()))
            }
            result => result,
        }
    }

    pub fn force_leader(&self, node_id: &str) -> Result<()> {
        self.election.force_leader(node_id)
    }

    pub fn trigger_failover(&self, failed_node_id: &str) -> Result<String> {
        self.election
            .trigger_failover(failed_node_id)
            .map_err(|err| match err.last_holder() {
                Some(_) => err,
                None => err.with_holder(self.election.leader()),
            })
    }

    /// Clears a lock whoever holds it and records the reclamation.
    pub fn force_release_lock(&self, key: &str) -> Result<LockRecord> {
        let cleared = match self.locks.force_release(key)? {
            Some(record) => record,
            None => {
                return new_err(
                    ErrorKind::LockNotHeld,
                    format!("Lock '{}' has no live holder", key),
                    String::new(),
                )
            }
        };

        let mut record = FailoverRecord::new(
            cleared.holder_node_id(),
            FailoverReason::LockReclaimed,
            self.clock.now(),
        );
        record.lock_key = Some(key.to_string());
        record_failover(&self.store, self.config.backend_timeout, record);

        Ok(cleared)
    }

    /// Fails when this node is not the leader. The error carries the observed leader.
    pub fn require_leader(&self) -> Result<()> {
        if self.election.is_leader() {
            return Ok(());
        }

        Err(HaError::new(
            ErrorKind::NotLeader,
            format!("Node {} is not the leader", self.locks.node_id()),
            String::new(),
        )
        .with_holder(self.election.leader()))
    }
}
