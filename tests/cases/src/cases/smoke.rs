use std::sync::Arc;
use std::time::Duration;

use ha_modules::{MemoryLockBackend, SystemClock};

use crate::steps;

pub fn run() {
    let backend = Arc::new(MemoryLockBackend::new(SystemClock));
    let config = steps::fast_configuration();
    let mut cluster = steps::cluster::start_cluster(&["1", "2", "3"], backend, config);

    let leader = cluster
        .wait_for_leader(Duration::from_secs(2))
        .expect("a leader is elected");
    info!("Smoke: leader {}", leader);

    steps::sleep_ms(300);
    assert_eq!(vec![leader.clone()], cluster.leaders());

    let admin = cluster.node("1").administrator();
    let stats = admin.stats();
    assert_eq!(3, stats.total);
    assert_eq!(3, stats.online);
    assert_eq!(3, admin.sessions().expect("store available").len());

    let granted: Vec<bool> = cluster
        .nodes
        .iter()
        .map(|node| {
            node.services()
                .tasks
                .acquire_task_run("nightly-backup", None)
                .expect("backend available")
                .granted
        })
        .collect();
    assert_eq!(1, granted.iter().filter(|granted| **granted).count());

    let old_leader = cluster.remove(&leader);
    old_leader.shutdown();

    let new_leader = cluster
        .wait_for_leader(Duration::from_secs(2))
        .expect("a new leader is elected");
    assert_ne!(leader, new_leader);

    let lease = cluster
        .node(&new_leader)
        .administrator()
        .current_leader()
        .expect("backend available")
        .expect("leader lease present");
    assert_eq!(2, lease.term);

    cluster.terminate();
}
