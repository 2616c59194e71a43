use std::cmp;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::common::clock::{Clock, Timestamp};
use crate::errors::Result;
use crate::lock::backend::LockBackend;
use crate::lock::service::DistributedLockService;
use crate::lock::{FencingToken, Lease, LeaseOutcome, RenewalPolicy};
use crate::membership::ClusterMembership;
use crate::node::configuration::HaConfiguration;
use crate::store::ClusterStore;

/// Prefix of the per-task lock keys.
pub const TASK_KEY_PREFIX: &str = "task:";

pub fn task_lock_key(task_id: &str) -> String {
    format!("{}{}", TASK_KEY_PREFIX, task_id)
}

/// Answer to a scheduler asking whether it may run a task on this node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskGrant {
    pub granted: bool,
    /// Present when granted. Passed back to `complete_task_run`.
    pub token: Option<FencingToken>,
}

impl TaskGrant {
    fn denied() -> TaskGrant {
        TaskGrant {
            granted: false,
            token: None,
        }
    }
}

/// A task run this node holds the lock for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskRun {
    pub task_id: String,
    pub token: FencingToken,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    pub extensions: u32,
}

struct TaskBinding {
    lease: Lease,
    acquired_at: Timestamp,
}

/// Keeps a scheduled task from running on two nodes at once.
pub struct TaskHaManager<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    node_id: String,
    locks: Arc<DistributedLockService<B, C>>,
    membership: Arc<ClusterMembership<S, C>>,
    clock: C,
    config: HaConfiguration,
    running: RwLock<HashMap<String, TaskBinding>>,
}

impl<B, S, C> TaskHaManager<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub fn new(
        locks: Arc<DistributedLockService<B, C>>,
        membership: Arc<ClusterMembership<S, C>>,
        clock: C,
        config: HaConfiguration,
    ) -> TaskHaManager<B, S, C> {
        TaskHaManager {
            node_id: locks.node_id().to_string(),
            locks,
            membership,
            clock,
            config,
            running: RwLock::new(HashMap::new()),
        }
    }

    /// Lock ttl for a run: the estimate (or the default), never below the minimum.
    pub fn task_lock_ttl(&self, estimated_duration: Option<Duration>) -> Duration {
        let ttl = estimated_duration.unwrap_or(self.config.default_task_lock_ttl);
        cmp::max(ttl, self.config.min_task_lock_ttl)
    }

    /// Asks for the exclusive right to run the task. An error means the caller must skip the run.
    pub fn acquire_task_run(
        &self,
        task_id: &str,
        estimated_duration: Option<Duration>,
    ) -> Result<TaskGrant> {
        if !self.membership.is_eligible(&self.node_id) {
            info!("Node {} Not eligible to run task {}", self.node_id, task_id);
            return Ok(TaskGrant::denied());
        }

        let ttl = self.task_lock_ttl(estimated_duration);
        let policy = RenewalPolicy::Limited(self.config.max_task_lock_extensions);
        let lease = match self.locks.try_lock_with(&task_lock_key(task_id), ttl, policy)? {
            Some(lease) => lease,
            None => {
                trace!("Node {} Task {} is running elsewhere", self.node_id, task_id);
                return Ok(TaskGrant::denied());
            }
        };

        let token = lease.token.clone();
        self.running.write().insert(
            task_id.to_string(),
            TaskBinding {
                lease,
                acquired_at: self.clock.now(),
            },
        );

        info!("Node {} Granted task {} for {:?}", self.node_id, task_id, ttl);
        Ok(TaskGrant {
            granted: true,
            token: Some(token),
        })
    }

    /// Releases the task lock. Completing an unknown or already completed run does nothing.
    pub fn complete_task_run(&self, task_id: &str, token: &FencingToken) -> Result<()> {
        let binding = {
            let mut running = self.running.write();
            match running.get(task_id) {
                Some(binding) if binding.lease.token == *token => running.remove(task_id),
                _ => None,
            }
        };

        let binding = match binding {
            Some(binding) => binding,
            None => {
                trace!("Node {} Task {} already completed", self.node_id, task_id);
                return Ok(());
            }
        };

        match self.locks.unlock(&binding.lease)? {
            LeaseOutcome::Done => info!("Node {} Completed task {}", self.node_id, task_id),
            outcome => warn!(
                "Node {} Completed task {} after its lock was lost: {}",
                self.node_id, task_id, outcome
            ),
        }
        Ok(())
    }

    /// Tasks this node still holds the lock for, ordered by id.
    pub fn running_tasks(&self) -> Vec<String> {
        self.prune_lost();

        let mut tasks: Vec<String> = self.running.read().keys().cloned().collect();
        tasks.sort();
        tasks
    }

    pub fn task_run(&self, task_id: &str) -> Option<TaskRun> {
        let (token, acquired_at) = {
            let running = self.running.read();
            let binding = running.get(task_id)?;
            (binding.lease.token.clone(), binding.acquired_at)
        };

        let info = self.locks.lease_info(&task_lock_key(task_id))?;
        if info.lease.token != token {
            return None;
        }

        Some(TaskRun {
            task_id: task_id.to_string(),
            token,
            acquired_at,
            expires_at: info.expires_at,
            extensions: info.extensions(),
        })
    }

    /// Releases every task lock in parallel. Returns the number of locks released.
    pub fn release_all(&self) -> usize {
        let bindings: Vec<(String, TaskBinding)> = self.running.write().drain().collect();

        bindings
            .into_par_iter()
            .filter(|(task_id, binding)| match self.locks.unlock(&binding.lease) {
                Ok(outcome) => outcome == LeaseOutcome::Done,
                Err(err) => {
                    warn!("Node {} Cannot release task {}: {}", self.node_id, task_id, err);
                    false
                }
            })
            .count()
    }

    fn prune_lost(&self) {
        let mut running = self.running.write();
        running.retain(|task_id, binding| {
            let held = self.locks.holds(&binding.lease);
            if !held {
                info!("Node {} Lost the lock of task {}", self.node_id, task_id);
            }
            held
        });
    }
}
