use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::call_with_timeout;
use crate::common::clock::{self, Clock, Timestamp};
use crate::errors::{new_err, ErrorKind, HaError, Result};
use crate::leadership::{record_failover, FailoverReason, FailoverRecord, LeaderHandoff, LeaderLease};
use crate::lock::backend::LockBackend;
use crate::lock::service::DistributedLockService;
use crate::lock::{Lease, RenewalPolicy};
use crate::membership::{ClusterMembership, NodeRole};
use crate::node::configuration::HaConfiguration;
use crate::store::ClusterStore;

/// Lock key guarding cluster leadership.
pub const LEADER_KEY: &str = "cluster:leader";

#[derive(Debug, Default)]
struct LeadershipState {
    lease: Option<Lease>,
    term: u64,
    cooldown_until: Option<Timestamp>,
    observed_leader: Option<String>,
}

/// Keeps at most one cluster leader on top of the `cluster:leader` lock.
///
/// Each `tick` either renews the leadership of this node or campaigns for it. The term lives in the
/// `leader_lease` row and is replaced with compare-and-set, so it grows by exactly one per election.
pub struct LeaderElectionService<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    node_id: String,
    locks: Arc<DistributedLockService<B, C>>,
    membership: Arc<ClusterMembership<S, C>>,
    store: Arc<S>,
    clock: C,
    config: HaConfiguration,
    state: RwLock<LeadershipState>,
}

impl<B, S, C> LeaderElectionService<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub fn new(
        locks: Arc<DistributedLockService<B, C>>,
        membership: Arc<ClusterMembership<S, C>>,
        store: Arc<S>,
        clock: C,
        config: HaConfiguration,
    ) -> LeaderElectionService<B, S, C> {
        LeaderElectionService {
            node_id: locks.node_id().to_string(),
            locks,
            membership,
            store,
            clock,
            config,
            state: RwLock::new(LeadershipState::default()),
        }
    }

    /// One election round. Returns the role of this node afterwards.
    pub fn tick(&self) -> NodeRole {
        let eligible = self.membership.is_eligible(&self.node_id);
        let current = self.state.read().lease.clone();

        match current {
            Some(lease) => self.keep_leadership(lease, eligible),
            None => self.campaign(eligible),
        }
    }

    /// True while this node holds a leader lease that has not expired.
    pub fn is_leader(&self) -> bool {
        self.live_lease().is_some()
    }

    /// Term of the leadership held by this node.
    pub fn term(&self) -> Option<u64> {
        self.live_lease()?;
        Some(self.state.read().term)
    }

    /// Leader as last observed by this node.
    pub fn leader(&self) -> Option<String> {
        match self.live_lease() {
            Some(_) => Some(self.node_id.clone()),
            None => self.state.read().observed_leader.clone(),
        }
    }

    /// The `leader_lease` row, if its leader currently holds the leader lock.
    pub fn current_leader(&self) -> Result<Option<LeaderLease>> {
        let holder = match self.locks.holder(LEADER_KEY)? {
            Some(holder) => holder,
            None => return Ok(None),
        };

        let lease = self.store_call("leader_lease", |s| s.leader_lease())?;
        Ok(lease
            .filter(|lease| lease.leader_node_id == holder.holder_node_id())
            .map(|lease| LeaderLease {
                expires_at: holder.expires_at,
                ..lease
            }))
    }

    /// Gives up leadership and abstains from campaigning for one election interval.
    pub fn resign(&self) -> Result<()> {
        let lease = match self.live_lease() {
            Some(lease) => lease,
            None => {
                return new_err(
                    ErrorKind::NotLeader,
                    format!("Node {} cannot resign", self.node_id),
                    String::new(),
                )
            }
        };

        let cooldown_until = clock::add(self.clock.now(), self.config.election_interval);
        self.state.write().cooldown_until = Some(cooldown_until);

        self.step_down(&lease, FailoverReason::Resigned);
        Ok(())
    }

    /// Moves leadership to `target_node_id`.
    ///
    /// For a remote target a hand-off record keeps the other nodes from campaigning while the
    /// target picks the lock up on its next tick. For the local node the lock is taken at once.
    pub fn force_leader(&self, target_node_id: &str) -> Result<()> {
        let now = self.clock.now();
        let remote = target_node_id != self.node_id;

        if self.membership.node(target_node_id).is_none() {
            return new_err(
                ErrorKind::NodeNotFound,
                format!("Cannot force leadership to unknown node {}", target_node_id),
                String::new(),
            );
        }
        if !self.membership.is_eligible(target_node_id) {
            return new_err(
                ErrorKind::ElectionNotWon,
                format!("Node {} is not eligible for leadership", target_node_id),
                String::new(),
            );
        }

        if remote {
            let handoff = LeaderHandoff {
                target_node_id: target_node_id.to_string(),
                expires_at: clock::add(now, self.config.leader_lease_ttl),
            };
            self.store_call("set_leader_handoff", move |s| {
                s.set_leader_handoff(Some(handoff))
            })?;
        }

        let cleared = self.locks.force_release(LEADER_KEY)?;
        let previous_holder = cleared.map(|record| record.holder_node_id().to_string());

        let own_lease = self.state.read().lease.clone();
        if let Some(lease) = own_lease {
            if self.take_lease(&lease) {
                info!("Node {} Leadership overridden by force", self.node_id);
                self.membership.set_leader(None);
            }
        }

        if remote {
            info!(
                "Node {} Leadership hand-off to {} requested (previous holder: {:?})",
                self.node_id, target_node_id, previous_holder
            );
            return Ok(());
        }

        match self.claim_leadership(FailoverReason::Forced) {
            Ok(true) => Ok(()),
            Ok(false) => {
                let holder = match self.locks.holder(LEADER_KEY) {
                    Ok(Some(record)) => Some(record.holder_node_id().to_string()),
                    _ => previous_holder,
                };
                Err(HaError::new(
                    ErrorKind::ForcedOverrideConflict,
                    format!("Node {} lost the leader lock right after clearing it", self.node_id),
                    String::new(),
                )
                .with_holder(holder))
            }
            Err(err) => Err(err.with_holder(previous_holder)),
        }
    }

    /// Hands leadership to the best eligible node other than `failed_node_id`.
    pub fn trigger_failover(&self, failed_node_id: &str) -> Result<String> {
        let candidate = match self.membership.select_failover_candidate(Some(failed_node_id)) {
            Some(candidate) => candidate,
            None => {
                return new_err(
                    ErrorKind::ElectionNotWon,
                    format!("No eligible failover candidate besides {}", failed_node_id),
                    String::new(),
                )
            }
        };

        let previous_leader = self.leader();
        self.force_leader(&candidate.id)?;

        let mut record = FailoverRecord::new(failed_node_id, FailoverReason::Failover, self.clock.now());
        record.previous_leader = previous_leader;
        record.new_leader = Some(candidate.id.clone());
        record_failover(&self.store, self.config.backend_timeout, record);

        Ok(candidate.id)
    }

    /// Releases the leader lock if this node holds it.
    pub fn shutdown(&self) {
        let lease = self.state.read().lease.clone();
        if let Some(lease) = lease {
            self.step_down(&lease, FailoverReason::Resigned);
        }
    }

    fn keep_leadership(&self, lease: Lease, eligible: bool) -> NodeRole {
        if !eligible {
            info!("Node {} Is no longer eligible, stepping down", self.node_id);
            self.step_down(&lease, FailoverReason::Disabled);
            return NodeRole::Follower;
        }

        let ttl = self.config.leader_lease_ttl;
        let renewed = self
            .locks
            .renew(&lease, ttl)
            .and_then(|outcome| outcome.into_result(&lease));
        if let Err(err) = renewed {
            warn!("Node {} Leader lease renewal failed: {}", self.node_id, err);
            self.step_down(&lease, FailoverReason::LostRenewal);
            return NodeRole::Follower;
        }

        let term = self.state.read().term;
        let expires_at = clock::add(self.clock.now(), ttl);
        let node_id = self.node_id.clone();
        match self.store_call("extend_leader_lease", move |s| {
            s.extend_leader_lease(&node_id, term, expires_at)
        }) {
            Ok(true) => {
                trace!("Node {} Leadership renewed (term {})", self.node_id, term);
                NodeRole::Leader
            }
            Ok(false) => {
                warn!("Node {} Term {} was superseded", self.node_id, term);
                self.step_down(&lease, FailoverReason::LostRenewal);
                NodeRole::Follower
            }
            Err(err) => {
                warn!("Node {} Cannot extend the leader lease row: {}", self.node_id, err);
                NodeRole::Leader
            }
        }
    }

    fn campaign(&self, eligible: bool) -> NodeRole {
        if !eligible {
            trace!("Node {} Not eligible, skipping the election", self.node_id);
            self.observe();
            return NodeRole::Follower;
        }

        let now = self.clock.now();
        let cooldown_until = self.state.read().cooldown_until;
        if let Some(until) = cooldown_until {
            if now < until {
                trace!("Node {} Abstains after resigning", self.node_id);
                self.observe();
                return NodeRole::Follower;
            }
        }

        let handoff = match self.store_call("leader_handoff", |s| s.leader_handoff()) {
            Ok(handoff) => handoff.filter(|handoff| handoff.is_live(now)),
            Err(err) => {
                warn!("Node {} Cannot read the leader hand-off: {}", self.node_id, err);
                return NodeRole::Follower;
            }
        };

        let reason = match &handoff {
            Some(handoff) if handoff.target_node_id != self.node_id => {
                trace!(
                    "Node {} Abstains: leadership is handed off to {}",
                    self.node_id,
                    handoff.target_node_id
                );
                self.observe();
                return NodeRole::Follower;
            }
            Some(_) => FailoverReason::Forced,
            None => FailoverReason::Election,
        };

        match self.claim_leadership(reason) {
            Ok(true) => NodeRole::Leader,
            Ok(false) => {
                self.observe();
                NodeRole::Follower
            }
            Err(err) => {
                warn!("Node {} Election failed: {}", self.node_id, err);
                NodeRole::Follower
            }
        }
    }

    // Takes the leader lock and moves the term forward. Ok(false) means another node won.
    fn claim_leadership(&self, reason: FailoverReason) -> Result<bool> {
        let ttl = self.config.leader_lease_ttl;
        let lease = match self
            .locks
            .try_lock_with(LEADER_KEY, ttl, RenewalPolicy::Manual)?
        {
            Some(lease) => lease,
            None => return Ok(false),
        };
        self.membership.set_candidate();

        let previous = match self.store_call("leader_lease", |s| s.leader_lease()) {
            Ok(previous) => previous,
            Err(err) => {
                self.abandon(&lease);
                return Err(err);
            }
        };

        let previous_term = previous.as_ref().map_or(0, |lease| lease.term);
        let now = self.clock.now();
        let leader_lease = LeaderLease {
            leader_node_id: self.node_id.clone(),
            term: previous_term + 1,
            acquired_at: now,
            expires_at: clock::add(now, ttl),
        };

        let replaced = {
            let leader_lease = leader_lease.clone();
            self.store_call("replace_leader_lease", move |s| {
                s.replace_leader_lease(previous_term, &leader_lease)
            })
        };
        match replaced {
            Ok(true) => {}
            Ok(false) => {
                info!("Node {} Lost the term {} race", self.node_id, leader_lease.term);
                self.abandon(&lease);
                return Ok(false);
            }
            Err(err) => {
                self.abandon(&lease);
                return Err(err);
            }
        }

        {
            let mut state = self.state.write();
            state.lease = Some(lease);
            state.term = leader_lease.term;
            state.cooldown_until = None;
            state.observed_leader = Some(self.node_id.clone());
        }

        if reason == FailoverReason::Forced {
            if let Err(err) = self.store_call("set_leader_handoff", |s| s.set_leader_handoff(None)) {
                warn!("Node {} Cannot clear the leader hand-off: {}", self.node_id, err);
            }
        }

        self.membership.set_leader(Some(&self.node_id));
        info!("Node {} Became leader for term {}", self.node_id, leader_lease.term);

        let mut record = FailoverRecord::new(&self.node_id, reason, now);
        record.previous_leader = previous.map(|lease| lease.leader_node_id);
        record.new_leader = Some(self.node_id.clone());
        record_failover(&self.store, self.config.backend_timeout, record);

        Ok(true)
    }

    fn step_down(&self, lease: &Lease, reason: FailoverReason) {
        if !self.take_lease(lease) {
            return;
        }

        match self.locks.unlock(lease) {
            Ok(outcome) => trace!("Node {} Leader lock release: {}", self.node_id, outcome),
            Err(err) => warn!(
                "Node {} Cannot release the leader lock, it lapses at its ttl: {}",
                self.node_id, err
            ),
        }
        self.membership.set_leader(None);
        info!("Node {} Stepped down ({})", self.node_id, reason);

        let mut record = FailoverRecord::new(&self.node_id, reason, self.clock.now());
        record.previous_leader = Some(self.node_id.clone());
        record_failover(&self.store, self.config.backend_timeout, record);
    }

    fn abandon(&self, lease: &Lease) {
        if let Err(err) = self.locks.unlock(lease) {
            warn!("Node {} Cannot release the abandoned leader lock: {}", self.node_id, err);
        }
        self.membership.set_leader(None);
    }

    // The leader lease, unless it expired locally. An expired lease is given up as lost.
    fn live_lease(&self) -> Option<Lease> {
        let lease = self.state.read().lease.clone()?;
        if self.locks.holds(&lease) {
            return Some(lease);
        }

        warn!("Node {} Leader lease expired before it was renewed", self.node_id);
        self.step_down(&lease, FailoverReason::LostRenewal);
        None
    }

    // Clears the local leadership if it is still `lease`.
    fn take_lease(&self, lease: &Lease) -> bool {
        let mut state = self.state.write();
        match &state.lease {
            Some(current) if current == lease => {
                state.lease = None;
                state.observed_leader = None;
                true
            }
            _ => false,
        }
    }

    fn observe(&self) {
        let leader = match self.locks.holder(LEADER_KEY) {
            Ok(holder) => holder.map(|record| record.holder_node_id().to_string()),
            Err(err) => {
                trace!("Node {} Cannot observe the leader: {}", self.node_id, err);
                return;
            }
        };

        let changed = {
            let mut state = self.state.write();
            if state.observed_leader != leader {
                state.observed_leader = leader.clone();
                true
            } else {
                false
            }
        };

        if changed {
            info!("Node {} Observed leader: {:?}", self.node_id, leader);
            self.membership.set_leader(leader.as_deref());
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
