#[macro_use]
extern crate log;
extern crate chrono;
extern crate env_logger;

extern crate ha_coordinator;
extern crate ha_modules;

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::prelude::{DateTime, Local};

use ha_coordinator::{HaConfiguration, HaNode, NodeConfiguration, NodeIdentity};
use ha_modules::{MemoryClusterStore, MemoryLockBackend, SystemClock};

type DemoNode = HaNode<MemoryLockBackend<SystemClock>, MemoryClusterStore, SystemClock>;

fn init_logger() {
    env_logger::builder()
        .format(|buf, record| {
            let now: DateTime<Local> = Local::now();
            writeln!(buf, "{:5}: {} - {}", record.level(), now.format("%H:%M:%S.%3f"), record.args())
        })
        .init();
}

fn demo_configuration() -> HaConfiguration {
    HaConfiguration {
        heartbeat_interval: Duration::from_millis(200),
        miss_threshold: 3,
        offline_threshold: Duration::from_millis(1500),
        status_check_interval: Duration::from_millis(200),
        leader_lease_ttl: Duration::from_millis(1500),
        election_interval: Duration::from_millis(300),
        default_task_lock_ttl: Duration::from_secs(3),
        min_task_lock_ttl: Duration::from_secs(1),
        max_task_lock_extensions: 5,
        backend_timeout: Duration::from_millis(500),
    }
}

fn main() {
    init_logger();
    info!("In-process HA cluster started");

    let backend = Arc::new(MemoryLockBackend::new(SystemClock));
    let store = Arc::new(MemoryClusterStore::new());

    let mut nodes: Vec<DemoNode> = Vec::new();
    for (index, node_id) in ["node-1", "node-2", "node-3"].iter().enumerate() {
        let identity = NodeIdentity::new(node_id, &format!("127.0.0.1:{}", 51000 + index))
            .with_weight(3 - index as u32);
        let node_config = NodeConfiguration {
            identity,
            ha: demo_configuration(),
            lock_backend: backend.clone(),
            cluster_store: store.clone(),
            clock: SystemClock,
        };

        match ha_coordinator::start_node(node_config) {
            Ok(node) => nodes.push(node),
            Err(err) => {
                error!("Cannot start {}: {}", node_id, err);
                return;
            }
        }
    }

    thread::sleep(Duration::from_secs(2));

    let admin = nodes[0].administrator();
    match admin.current_leader() {
        Ok(Some(leader)) => info!("{}", leader),
        Ok(None) => warn!("No leader yet"),
        Err(err) => error!("Cannot read the leader: {}", err),
    }

    for node in nodes.iter() {
        let tasks = &node.services().tasks;
        match tasks.acquire_task_run("nightly-report", None) {
            Ok(grant) => info!("{} asked to run nightly-report: granted={}", node.node_id(), grant.granted),
            Err(err) => warn!("{} skips nightly-report: {}", node.node_id(), err),
        }
    }

    if let Some(position) = nodes.iter().position(|node| node.services().election.is_leader()) {
        let leader = nodes.remove(position);
        info!("Stopping the leader {}", leader.node_id());
        leader.shutdown();
    }

    thread::sleep(Duration::from_secs(2));

    let admin = nodes[0].administrator();
    if let Ok(Some(leader)) = admin.current_leader() {
        info!("After failover: {}", leader);
    }
    if let Ok(history) = admin.failover_history() {
        for record in history.iter().rev() {
            info!(
                "#{} {} node={} previous={:?} new={:?}",
                record.id, record.reason, record.node_id, record.previous_leader, record.new_leader
            );
        }
    }
    info!("Cluster stats: {:?}", admin.stats());

    for node in nodes {
        node.shutdown();
    }
    info!("In-process HA cluster stopped");
}
