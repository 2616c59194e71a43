use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ha_coordinator::{DistributedLockService, RenewalPolicy, LEADER_KEY};
use ha_modules::{MemoryLockBackend, SystemClock};

const CONTENDERS: usize = 8;

pub fn run() {
    let backend = Arc::new(MemoryLockBackend::new(SystemClock));
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = (0..CONTENDERS)
        .map(|index| {
            let backend = backend.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let locks = DistributedLockService::new(
                    &format!("node-{}", index),
                    backend,
                    SystemClock,
                    Duration::from_secs(1),
                );
                barrier.wait();

                let lease = locks
                    .try_lock_with(LEADER_KEY, Duration::from_secs(10), RenewalPolicy::Manual)
                    .expect("backend available");
                lease.map(|lease| lease.node_id().to_string())
            })
        })
        .collect();

    let winners: Vec<String> = handles
        .into_iter()
        .filter_map(|handle| handle.join().expect("contender finished"))
        .collect();

    assert_eq!(1, winners.len());
    info!("Mutual exclusion: {} won", winners[0]);
}
