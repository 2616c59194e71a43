use std::sync::Arc;
use std::time::Duration;

use crate::common::clock::Clock;
use crate::errors::{new_err, ErrorKind, Result};
use crate::lock::backend::LockBackend;
use crate::membership::NodeIdentity;
use crate::store::ClusterStore;

/// Timings and limits of the coordination layer. Shared by every node of a cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct HaConfiguration {
    pub heartbeat_interval: Duration,
    /// Missed heartbeats after which a node becomes suspect.
    pub miss_threshold: u32,
    /// Heartbeat age after which a node is offline.
    pub offline_threshold: Duration,
    pub status_check_interval: Duration,
    pub leader_lease_ttl: Duration,
    pub election_interval: Duration,
    pub default_task_lock_ttl: Duration,
    pub min_task_lock_ttl: Duration,
    /// Automatic renewals of a task lock before it is left to expire.
    pub max_task_lock_extensions: u32,
    /// Upper bound of a single lock backend or cluster store call.
    pub backend_timeout: Duration,
}

impl Default for HaConfiguration {
    fn default() -> Self {
        HaConfiguration {
            heartbeat_interval: Duration::from_secs(10),
            miss_threshold: 3,
            offline_threshold: Duration::from_secs(60),
            status_check_interval: Duration::from_secs(10),
            leader_lease_ttl: Duration::from_secs(15),
            election_interval: Duration::from_secs(5),
            default_task_lock_ttl: Duration::from_secs(30),
            min_task_lock_ttl: Duration::from_secs(10),
            max_task_lock_extensions: 20,
            backend_timeout: Duration::from_secs(3),
        }
    }
}

impl HaConfiguration {
    /// Heartbeat age after which a node becomes suspect.
    pub fn suspect_after(&self) -> Duration {
        self.heartbeat_interval * self.miss_threshold
    }

    pub fn validate(&self) -> Result<()> {
        let zero = Duration::from_millis(0);
        let durations = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("offline_threshold", self.offline_threshold),
            ("status_check_interval", self.status_check_interval),
            ("leader_lease_ttl", self.leader_lease_ttl),
            ("election_interval", self.election_interval),
            ("default_task_lock_ttl", self.default_task_lock_ttl),
            ("min_task_lock_ttl", self.min_task_lock_ttl),
            ("backend_timeout", self.backend_timeout),
        ];
        for (name, value) in durations.iter() {
            if *value == zero {
                return invalid(format!("{} must be positive", name));
            }
        }

        if self.miss_threshold == 0 {
            return invalid("miss_threshold must be positive".to_string());
        }

        if self.offline_threshold <= self.suspect_after() {
            return invalid(format!(
                "offline_threshold ({:?}) must exceed miss_threshold x heartbeat_interval ({:?})",
                self.offline_threshold,
                self.suspect_after()
            ));
        }

        if self.election_interval >= self.leader_lease_ttl {
            return invalid(format!(
                "election_interval ({:?}) must be shorter than leader_lease_ttl ({:?})",
                self.election_interval, self.leader_lease_ttl
            ));
        }

        if self.backend_timeout >= self.leader_lease_ttl {
            return invalid(format!(
                "backend_timeout ({:?}) must be shorter than leader_lease_ttl ({:?})",
                self.backend_timeout, self.leader_lease_ttl
            ));
        }

        // A renewal sent at the end of an election interval must be answered before the lease lapses.
        if self.election_interval + self.backend_timeout >= self.leader_lease_ttl {
            return invalid(format!(
                "election_interval + backend_timeout ({:?}) must be shorter than leader_lease_ttl ({:?})",
                self.election_interval + self.backend_timeout,
                self.leader_lease_ttl
            ));
        }

        Ok(())
    }
}

fn invalid(text: String) -> Result<()> {
    new_err(ErrorKind::InvalidConfiguration, text, String::new())
}

/// Everything a node needs to start: its identity, the cluster timings and the shared storage.
#[derive(Debug)]
pub struct NodeConfiguration<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub identity: NodeIdentity,
    pub ha: HaConfiguration,
    pub lock_backend: Arc<B>,
    pub cluster_store: Arc<S>,
    pub clock: C,
}
