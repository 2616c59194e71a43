use std::sync::Arc;
use std::time::Duration;

use ha_coordinator::{DistributedLockService, LeaseOutcome, RenewalPolicy};
use ha_modules::{ManualClock, MemoryLockBackend};

pub fn run() {
    let clock = ManualClock::new(1_000_000);
    let backend = Arc::new(MemoryLockBackend::new(clock.clone()));
    let a = DistributedLockService::new("a", backend.clone(), clock.clone(), Duration::from_secs(1));
    let b = DistributedLockService::new("b", backend.clone(), clock.clone(), Duration::from_secs(1));

    let ttl = Duration::from_secs(10);
    let old_lease = a
        .try_lock_with("report", ttl, RenewalPolicy::Manual)
        .expect("backend available")
        .expect("lock is free");

    clock.advance(ttl - Duration::from_millis(1));
    assert!(b
        .try_lock_with("report", ttl, RenewalPolicy::Manual)
        .expect("backend available")
        .is_none());

    clock.advance(Duration::from_millis(1));
    let new_lease = b
        .try_lock_with("report", ttl, RenewalPolicy::Manual)
        .expect("backend available")
        .expect("expired lock is free");

    // The expired holder is fenced off: nothing it does touches the new row.
    assert_eq!(
        LeaseOutcome::NotHeldLocally,
        a.renew(&old_lease, ttl).expect("backend available")
    );
    assert_eq!(
        LeaseOutcome::Stale,
        a.unlock(&old_lease).expect("backend available")
    );
    let row = backend.raw_row("report").expect("row present");
    assert_eq!(new_lease.token, row.token);
    assert_eq!(0, row.renew_count);

    let holder = a.holder("report").expect("backend available").expect("b holds it");
    assert_eq!("b", holder.holder_node_id());
}
