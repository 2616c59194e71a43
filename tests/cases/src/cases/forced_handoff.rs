use std::sync::Arc;

use ha_coordinator::{ClusterStore, FailoverReason, NodeRole};
use ha_modules::{ManualClock, MemoryClusterStore, MemoryLockBackend};

use crate::steps;

pub fn run() {
    let clock = ManualClock::new(5_000);
    let backend = Arc::new(MemoryLockBackend::new(clock.clone()));
    let store = Arc::new(MemoryClusterStore::new());

    let a = steps::manual_services("a", 1, &backend, &store, &clock);
    let b = steps::manual_services("b", 3, &backend, &store, &clock);
    let c = steps::manual_services("c", 2, &backend, &store, &clock);
    steps::refresh_views(&[&a, &b, &c]);

    assert_eq!(NodeRole::Leader, a.election.tick());

    // Hand-off to a remote node: the old leader is fenced, the others abstain.
    c.administrator().force_leader("b").expect("b is eligible");
    assert_eq!(NodeRole::Follower, a.election.tick());
    assert_eq!(NodeRole::Follower, a.election.tick());
    assert_eq!(NodeRole::Follower, c.election.tick());
    assert_eq!(NodeRole::Leader, b.election.tick());
    assert_eq!(Some(2), b.election.term());

    // Forced takeover by the calling node.
    c.administrator().force_leader("c").expect("c takes the lock");
    assert_eq!(Some(3), c.election.term());
    assert_eq!(NodeRole::Follower, b.election.tick());

    // Failover away from c goes to the heaviest remaining node.
    let candidate = a.administrator().trigger_failover("c").expect("a candidate exists");
    assert_eq!("b", candidate);
    assert_eq!(NodeRole::Follower, c.election.tick());
    assert_eq!(NodeRole::Leader, b.election.tick());
    assert_eq!(Some(4), b.election.term());

    let lease = store.leader_lease().expect("store available").expect("lease row");
    assert_eq!("b", lease.leader_node_id);
    assert_eq!(4, lease.term);

    let reasons: Vec<FailoverReason> = a
        .administrator()
        .failover_history()
        .expect("store available")
        .into_iter()
        .map(|record| record.reason)
        .collect();
    assert_eq!(Some(&FailoverReason::Forced), reasons.first());
    assert!(reasons.contains(&FailoverReason::Failover));
    assert!(reasons.contains(&FailoverReason::LostRenewal));
    assert_eq!(Some(&FailoverReason::Election), reasons.last());
}
