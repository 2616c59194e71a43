use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::common::clock::{self, Clock, Timestamp};
use crate::common::{call_with_timeout, run_worker, Worker};
use crate::errors::{new_err, ErrorKind, Result};
use crate::lock::backend::LockBackend;
use crate::lock::renewal::{renew_lease_periodically, RenewalParams};
use crate::lock::{FencingToken, Lease, LeaseInfo, LeaseOutcome, LockRecord, RenewalPolicy};

/// Consecutive backend failures after which a lease is no longer trusted.
const MAX_FAILED_RENEWALS: u32 = 2;

/// Named mutual exclusion over a `LockBackend`.
///
/// Tracks the leases this node holds and keeps them alive according to their `RenewalPolicy`.
/// The local lease table is only locked around in-memory changes; backend calls happen outside it.
pub struct DistributedLockService<B: LockBackend, C: Clock> {
    core: Arc<LockServiceCore<B, C>>,
}

pub(crate) struct LockServiceCore<B: LockBackend, C: Clock> {
    node_id: String,
    backend: Arc<B>,
    clock: C,
    backend_timeout: Duration,
    leases: RwLock<HashMap<String, LocalLease>>,
}

struct LocalLease {
    info: LeaseInfo,
    failed_renewals: u32,
    renewal_worker: Option<Worker>,
}

impl LocalLease {
    fn stop_renewal(&mut self) {
        if let Some(worker) = self.renewal_worker.take() {
            worker.signal_termination();
        }
    }
}

impl<B: LockBackend, C: Clock> DistributedLockService<B, C> {
    pub fn new(
        node_id: &str,
        backend: Arc<B>,
        clock: C,
        backend_timeout: Duration,
    ) -> DistributedLockService<B, C> {
        DistributedLockService {
            core: Arc::new(LockServiceCore {
                node_id: node_id.to_string(),
                backend,
                clock,
                backend_timeout,
                leases: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.core.node_id
    }

    /// Tries once to take the lock and renews it every `ttl/3` until it is released.
    pub fn try_lock(&self, key: &str, ttl: Duration) -> Result<Option<Lease>> {
        self.try_lock_with(key, ttl, RenewalPolicy::Unlimited)
    }

    /// Tries once to take the lock. `Ok(None)` means another holder owns it.
    pub fn try_lock_with(
        &self,
        key: &str,
        ttl: Duration,
        policy: RenewalPolicy,
    ) -> Result<Option<Lease>> {
        if ttl == Duration::from_millis(0) {
            return new_err(
                ErrorKind::InvalidConfiguration,
                format!("Cannot lock '{}' with zero ttl", key),
                String::new(),
            );
        }

        let core = &self.core;
        if core.held_locally(key) {
            trace!("Node {} Lock '{}' is already held locally", core.node_id, key);
            return Ok(None);
        }

        let token = FencingToken::new(&core.node_id);
        // Taken before the call so the local deadline never outlives the backend row.
        let now = core.clock.now();
        let acquired = {
            let (key, token) = (key.to_string(), token.clone());
            call_with_timeout(&core.backend, core.backend_timeout, "acquire", move |b| {
                b.acquire(&key, &token, ttl)
            })?
        };

        if !acquired {
            trace!("Node {} Lock '{}' is held by another node", core.node_id, key);
            return Ok(None);
        }

        let lease = Lease {
            key: key.to_string(),
            token,
        };
        let info = LeaseInfo {
            lease: lease.clone(),
            ttl,
            acquired_at: now,
            expires_at: clock::add(now, ttl),
            renew_count: 0,
            policy,
        };

        let renewal_worker = match policy {
            RenewalPolicy::Manual => None,
            _ => Some(run_worker(
                renew_lease_periodically,
                RenewalParams {
                    core: self.core.clone(),
                    lease: lease.clone(),
                    ttl,
                    policy,
                },
            )),
        };

        let mut leases = core.leases.write();
        if let Some(mut previous) = leases.insert(
            key.to_string(),
            LocalLease {
                info,
                failed_renewals: 0,
                renewal_worker,
            },
        ) {
            previous.stop_renewal();
        }

        info!("Node {} Acquired {} for {:?}", core.node_id, lease, ttl);
        Ok(Some(lease))
    }

    /// Releases a lease held by this node.
    pub fn unlock(&self, lease: &Lease) -> Result<LeaseOutcome> {
        let core = &self.core;
        let removed = {
            let mut leases = core.leases.write();
            match leases.get(&lease.key) {
                Some(local) if local.info.lease.token == lease.token => leases.remove(&lease.key),
                _ => None,
            }
        };

        let mut local = match removed {
            Some(local) => local,
            None => {
                trace!("Node {} Unlock skipped: {} not held locally", core.node_id, lease);
                return Ok(LeaseOutcome::NotHeldLocally);
            }
        };
        local.stop_renewal();

        let released = {
            let (key, token) = (lease.key.clone(), lease.token.clone());
            call_with_timeout(&core.backend, core.backend_timeout, "release", move |b| {
                b.release(&key, &token)
            })?
        };

        if released {
            info!("Node {} Released {}", core.node_id, lease);
            Ok(LeaseOutcome::Done)
        } else {
            warn!("Node {} Release rejected for {}: fencing token is stale", core.node_id, lease);
            Ok(LeaseOutcome::Stale)
        }
    }

    /// Extends a lease held by this node to `now + ttl`.
    pub fn renew(&self, lease: &Lease, ttl: Duration) -> Result<LeaseOutcome> {
        self.core.renew(lease, ttl)
    }

    /// Reads the current holder from the backend.
    pub fn holder(&self, key: &str) -> Result<Option<LockRecord>> {
        let key = key.to_string();
        call_with_timeout(&self.core.backend, self.core.backend_timeout, "is_held", move |b| {
            b.is_held(&key)
        })
    }

    /// Lists the live rows of the backend.
    pub fn locks(&self) -> Result<Vec<LockRecord>> {
        call_with_timeout(&self.core.backend, self.core.backend_timeout, "locks", |b| b.locks())
    }

    /// Clears the key whoever holds it. Returns the row that was cleared.
    pub fn force_release(&self, key: &str) -> Result<Option<LockRecord>> {
        let core = &self.core;
        let released = {
            let key = key.to_string();
            call_with_timeout(&core.backend, core.backend_timeout, "force_release", move |b| {
                b.force_release(&key)
            })?
        };

        if let Some(mut local) = core.leases.write().remove(key) {
            local.stop_renewal();
        }

        match &released {
            Some(record) => warn!("Node {} Force released {}", core.node_id, record),
            None => info!("Node {} Force release of '{}': no live holder", core.node_id, key),
        }
        Ok(released)
    }

    pub fn holds(&self, lease: &Lease) -> bool {
        self.core.holds(lease)
    }

    pub fn lease_info(&self, key: &str) -> Option<LeaseInfo> {
        self.core.prune_expired();
        self.core.leases.read().get(key).map(|local| local.info.clone())
    }

    pub fn local_leases(&self) -> Vec<LeaseInfo> {
        self.core.prune_expired();
        let mut leases: Vec<LeaseInfo> = self
            .core
            .leases
            .read()
            .values()
            .map(|local| local.info.clone())
            .collect();
        leases.sort_by(|a, b| a.lease.key.cmp(&b.lease.key));
        leases
    }

    /// Best-effort release of every lease held by this node. Backend calls run in parallel.
    pub fn release_all(&self) -> Vec<(Lease, Result<LeaseOutcome>)> {
        let leases: Vec<Lease> = self
            .core
            .leases
            .read()
            .values()
            .map(|local| local.info.lease.clone())
            .collect();

        leases
            .into_par_iter()
            .map(|lease| {
                let result = self.unlock(&lease);
                if let Err(err) = &result {
                    warn!("Node {} Cannot release {}: {}", self.core.node_id, lease, err);
                }
                (lease, result)
            })
            .collect()
    }

    /// Stops every renewal worker. Held leases lapse at their ttl.
    pub fn stop_renewals(&self) {
        let mut leases = self.core.leases.write();
        for local in leases.values_mut() {
            local.stop_renewal();
        }
    }
}

impl<B: LockBackend, C: Clock> Drop for DistributedLockService<B, C> {
    fn drop(&mut self) {
        self.stop_renewals();
    }
}

impl<B: LockBackend, C: Clock> LockServiceCore<B, C> {
    pub(crate) fn node_id(&self) -> &str {
        &self.node_id
    }

    pub(crate) fn renew(&self, lease: &Lease, ttl: Duration) -> Result<LeaseOutcome> {
        if !self.holds(lease) {
            trace!("Node {} Renew skipped: {} not held locally", self.node_id, lease);
            return Ok(LeaseOutcome::NotHeldLocally);
        }

        let now = self.clock.now();
        let renew_result = {
            let (key, token) = (lease.key.clone(), lease.token.clone());
            call_with_timeout(&self.backend, self.backend_timeout, "renew", move |b| {
                b.renew(&key, &token, ttl)
            })
        };

        let mut leases = self.leases.write();
        let local = match leases.get_mut(&lease.key) {
            Some(local) if local.info.lease.token == lease.token => local,
            _ => return Ok(LeaseOutcome::NotHeldLocally),
        };

        match renew_result {
            Ok(true) => {
                local.info.ttl = ttl;
                local.info.expires_at = clock::add(now, ttl);
                local.info.renew_count += 1;
                local.failed_renewals = 0;
                trace!("Node {} Renewed {} (renewal #{})", self.node_id, lease, local.info.renew_count);
                Ok(LeaseOutcome::Done)
            }
            Ok(false) => {
                warn!("Node {} Renew rejected for {}: dropping the local lease", self.node_id, lease);
                if let Some(mut local) = leases.remove(&lease.key) {
                    local.stop_renewal();
                }
                Ok(LeaseOutcome::Stale)
            }
            Err(err) => {
                local.failed_renewals += 1;
                warn!(
                    "Node {} Renew of {} failed ({} in a row): {}",
                    self.node_id, lease, local.failed_renewals, err
                );
                if local.failed_renewals >= MAX_FAILED_RENEWALS {
                    warn!("Node {} Dropping {}: ownership cannot be proven", self.node_id, lease);
                    if let Some(mut local) = leases.remove(&lease.key) {
                        local.stop_renewal();
                    }
                }
                Err(err)
            }
        }
    }

    pub(crate) fn holds(&self, lease: &Lease) -> bool {
        let now = self.clock.now();
        match self.leases.read().get(&lease.key) {
            Some(local) => local.info.lease.token == lease.token && now < local.info.expires_at,
            None => false,
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn lease_info(&self, lease: &Lease) -> Option<LeaseInfo> {
        match self.leases.read().get(&lease.key) {
            Some(local) if local.info.lease.token == lease.token => Some(local.info.clone()),
            _ => None,
        }
    }

    fn held_locally(&self, key: &str) -> bool {
        let now = self.clock.now();
        match self.leases.read().get(key) {
            Some(local) => now < local.info.expires_at,
            None => false,
        }
    }

    fn prune_expired(&self) {
        let now: Timestamp = self.clock.now();
        let mut leases = self.leases.write();
        leases.retain(|key, local| {
            let live = now < local.info.expires_at;
            if !live {
                trace!("Node {} Local lease '{}' expired", self.node_id, key);
                local.stop_renewal();
            }
            live
        });
    }
}
