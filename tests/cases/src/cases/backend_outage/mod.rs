
use std::sync::Arc;
use std::time::Duration;

use ha_coordinator::ErrorKind;

use crate::steps;

/// With the lock backend unreachable no node ever becomes leader and no task is granted.
pub fn run() {
    let backend = Arc::new(stalled_lock_backend::StalledLockBackend::new(Duration::from_millis(300)));
    let config = steps::fast_configuration();
    let cluster = steps::cluster::start_cluster(&["1", "2"], backend, config);

    for _ in 0..6 {
        steps::sleep_ms(100);
        assert!(cluster.leaders().is_empty());
    }

    let admin = cluster.node("1").administrator();
    let err = admin.current_leader().expect_err("backend is down");
    assert_eq!(ErrorKind::BackendUnavailable, err.kind());

    let err = cluster
        .node("2")
        .services()
        .tasks
        .acquire_task_run("cleanup", None)
        .expect_err("backend is down");
    assert_eq!(ErrorKind::BackendUnavailable, err.kind());

    assert_eq!(2, admin.stats().online);

    cluster.terminate();
}
