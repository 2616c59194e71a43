use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ha_coordinator::{HaConfiguration, NodeConfiguration, NodeIdentity, NodeServices};
use ha_modules::{ManualClock, MemoryClusterStore, MemoryLockBackend};

pub mod cluster;

pub type ManualServices = NodeServices<MemoryLockBackend<ManualClock>, MemoryClusterStore, ManualClock>;

pub fn sleep_ms(millis: u64) {
    thread::sleep(Duration::from_millis(millis));
}

/// Short timings for clusters driven by worker threads and the system clock.
pub fn fast_configuration() -> HaConfiguration {
    HaConfiguration {
        heartbeat_interval: Duration::from_millis(50),
        miss_threshold: 3,
        offline_threshold: Duration::from_millis(400),
        status_check_interval: Duration::from_millis(50),
        leader_lease_ttl: Duration::from_millis(600),
        election_interval: Duration::from_millis(100),
        default_task_lock_ttl: Duration::from_secs(2),
        min_task_lock_ttl: Duration::from_millis(500),
        max_task_lock_extensions: 5,
        backend_timeout: Duration::from_millis(200),
    }
}

/// Services of one node without background workers. The case drives every step itself.
pub fn manual_services(
    node_id: &str,
    weight: u32,
    backend: &Arc<MemoryLockBackend<ManualClock>>,
    store: &Arc<MemoryClusterStore>,
    clock: &ManualClock,
) -> ManualServices {
    let services = NodeServices::new(NodeConfiguration {
        identity: NodeIdentity::new(node_id, "127.0.0.1:60000").with_weight(weight),
        ha: HaConfiguration::default(),
        lock_backend: backend.clone(),
        cluster_store: store.clone(),
        clock: clock.clone(),
    })
    .expect("default configuration is valid");

    services.membership.heartbeat().expect("memory store is available");
    services
}

/// Every node publishes a heartbeat, then every node reloads the cluster view.
pub fn refresh_views(nodes: &[&ManualServices]) {
    for node in nodes {
        node.membership.heartbeat().expect("memory store is available");
    }
    for node in nodes {
        node.membership.recompute_statuses();
    }
}
