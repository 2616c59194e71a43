use std::time::Duration;

use crate::common::clock::{self, Timestamp};
use crate::errors::{new_err, ErrorKind, Result};

pub mod backend;
mod renewal;
pub mod service;

/// Identifies one lease instance: `<node_id>:<instance_id>`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "{}:{}", node_id, instance_id)]
pub struct FencingToken {
    pub node_id: String,
    pub instance_id: String,
}

impl FencingToken {
    pub fn new(node_id: &str) -> FencingToken {
        FencingToken {
            node_id: node_id.to_string(),
            instance_id: crate::common::ids::new_instance_id(),
        }
    }

    /// Parses `<node_id>:<instance_id>`. The node id may itself contain ':'.
    pub fn parse(value: &str) -> Option<FencingToken> {
        let split = value.rfind(':')?;
        let (node_id, instance_id) = (&value[..split], &value[split + 1..]);
        if node_id.is_empty() || instance_id.is_empty() {
            return None;
        }

        Some(FencingToken {
            node_id: node_id.to_string(),
            instance_id: instance_id.to_string(),
        })
    }
}

/// One row of the `locks` table.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
#[display(fmt = "Lock {} held by {} until {}", key, token, expires_at)]
pub struct LockRecord {
    pub key: String,
    pub token: FencingToken,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    pub renew_count: u32,
}

impl LockRecord {
    pub fn holder_node_id(&self) -> &str {
        &self.token.node_id
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// A lock held by this node.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
#[display(fmt = "Lease {} ({})", key, token)]
pub struct Lease {
    pub key: String,
    pub token: FencingToken,
}

impl Lease {
    pub fn node_id(&self) -> &str {
        &self.token.node_id
    }
}

/// How the lock service keeps a lease alive after acquiring it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RenewalPolicy {
    /// The owner calls `renew` itself.
    Manual,
    /// Renewed every `ttl/3` until released.
    Unlimited,
    /// Renewed every `ttl/3` until the lease would run more than the given number of ttls past
    /// its first deadline.
    Limited(u32),
}

/// Result of `unlock` and `renew` that did not fail on the backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Display)]
pub enum LeaseOutcome {
    #[display(fmt = "done")]
    Done,
    #[display(fmt = "lease not held locally")]
    NotHeldLocally,
    #[display(fmt = "fencing token rejected")]
    Stale,
}

impl LeaseOutcome {
    /// Turns an unsuccessful outcome into an error of the matching kind.
    pub fn into_result(self, lease: &Lease) -> Result<()> {
        match self {
            LeaseOutcome::Done => Ok(()),
            LeaseOutcome::NotHeldLocally => new_err(
                ErrorKind::LockNotHeld,
                format!("{} is not held by this node", lease),
                String::new(),
            ),
            LeaseOutcome::Stale => new_err(
                ErrorKind::StaleFencingToken,
                format!("{} was rejected by the backend", lease),
                String::new(),
            ),
        }
    }
}

/// Snapshot of a locally held lease.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeaseInfo {
    pub lease: Lease,
    pub ttl: Duration,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    pub renew_count: u32,
    pub policy: RenewalPolicy,
}

impl LeaseInfo {
    /// Deadline set by the first acquisition.
    pub fn first_deadline(&self) -> Timestamp {
        clock::add(self.acquired_at, self.ttl)
    }

    /// Latest expiry a `Limited(max_extensions)` lease may be renewed to.
    pub fn extension_limit(&self, max_extensions: u32) -> Timestamp {
        let budget = clock::millis(self.ttl).saturating_mul(u64::from(max_extensions));
        self.first_deadline().saturating_add(budget)
    }

    /// Whole ttls the lease has been carried past its first deadline.
    pub fn extensions(&self) -> u32 {
        let ttl = clock::millis(self.ttl);
        if ttl == 0 {
            return 0;
        }
        let overrun = self.expires_at.saturating_sub(self.first_deadline());
        ((overrun + ttl - 1) / ttl) as u32
    }
}
