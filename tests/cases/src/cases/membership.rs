use std::sync::Arc;
use std::time::Duration;

use ha_coordinator::{NodeRole, NodeStatus};
use ha_modules::{ManualClock, MemoryClusterStore, MemoryLockBackend};

use crate::steps;

pub fn run() {
    let clock = ManualClock::new(0);
    let backend = Arc::new(MemoryLockBackend::new(clock.clone()));
    let store = Arc::new(MemoryClusterStore::new());

    let a = steps::manual_services("a", 1, &backend, &store, &clock);
    let b = steps::manual_services("b", 1, &backend, &store, &clock);
    steps::refresh_views(&[&a, &b]);

    b.election.tick();
    assert_eq!(Some(NodeRole::Leader), b.membership.node("b").map(|node| node.role));

    // b stops heartbeating: suspect after 3 x 10s, offline after 60s.
    clock.advance(Duration::from_secs(30));
    a.membership.heartbeat().expect("store available");
    a.membership.recompute_statuses();
    assert_eq!(NodeStatus::Suspect, status(&a, "b"));

    clock.advance(Duration::from_secs(30));
    a.membership.heartbeat().expect("store available");
    a.membership.recompute_statuses();
    assert_eq!(NodeStatus::Offline, status(&a, "b"));
    assert_eq!(Some(NodeRole::Follower), a.membership.node("b").map(|node| node.role));
    assert_eq!(1, a.membership.stats().offline);

    // b comes back and rejoins as follower.
    b.membership.heartbeat().expect("store available");
    a.membership.recompute_statuses();
    assert_eq!(NodeStatus::Online, status(&a, "b"));
    assert_eq!(Some(NodeRole::Follower), a.membership.node("b").map(|node| node.role));

    // Disabling overrides a fresh heartbeat.
    a.administrator().disable_node("b").expect("b is registered");
    b.membership.heartbeat().expect("store available");
    a.membership.recompute_statuses();
    b.membership.recompute_statuses();
    assert_eq!(NodeStatus::Offline, status(&a, "b"));
    assert!(!b.membership.is_eligible("b"));
    assert!(!b.tasks.acquire_task_run("9", None).expect("backend available").granted);

    a.administrator().enable_node("b").expect("b is registered");
    b.membership.recompute_statuses();
    assert!(b.membership.is_eligible("b"));
    assert_eq!(2, a.administrator().stats().total);
}

fn status(services: &steps::ManualServices, node_id: &str) -> NodeStatus {
    services
        .membership
        .node(node_id)
        .map(|node| node.status)
        .expect("node is known")
}
