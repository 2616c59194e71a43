use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::common::clock::{self, Clock};
use crate::lock::backend::LockBackend;
use crate::lock::service::LockServiceCore;
use crate::lock::{Lease, LeaseOutcome, RenewalPolicy};

pub(crate) struct RenewalParams<B: LockBackend, C: Clock> {
    pub core: Arc<LockServiceCore<B, C>>,
    pub lease: Lease,
    pub ttl: Duration,
    pub policy: RenewalPolicy,
}

/// Renewal period: at least two attempts fit into one ttl.
pub(crate) fn renewal_interval(ttl: Duration) -> Duration {
    let interval = ttl / 3;
    if interval < Duration::from_millis(1) {
        Duration::from_millis(1)
    } else {
        interval
    }
}

pub(crate) fn renew_lease_periodically<B: LockBackend, C: Clock>(
    params: RenewalParams<B, C>,
    terminate_worker_rx: Receiver<()>,
) {
    let node_id = params.core.node_id().to_string();
    trace!("Node {} Renewal worker for {} started", node_id, params.lease);

    let ticker = crossbeam_channel::tick(renewal_interval(params.ttl));
    loop {
        select!(
            recv(terminate_worker_rx) -> res => {
                if res.is_err() {
                    trace!("Node {} Renewal worker for {} lost its owner", node_id, params.lease);
                }
                break
            },
            recv(ticker) -> _ => {
                if !renew_once(&params) {
                    break
                }
            }
        );
    }

    trace!("Node {} Renewal worker for {} stopped", node_id, params.lease);
}

// Returns false once the lease should no longer be renewed.
pub(crate) fn renew_once<B: LockBackend, C: Clock>(params: &RenewalParams<B, C>) -> bool {
    let info = match params.core.lease_info(&params.lease) {
        Some(info) => info,
        None => return false,
    };

    if let RenewalPolicy::Limited(max_extensions) = params.policy {
        let limit = info.extension_limit(max_extensions);
        if clock::add(params.core.now(), params.ttl) > limit {
            info!(
                "Node {} Extension limit ({}) reached for {}. The lease lapses at its ttl",
                params.core.node_id(),
                max_extensions,
                params.lease
            );
            return false;
        }
    }

    match params.core.renew(&params.lease, params.ttl) {
        Ok(LeaseOutcome::Done) => true,
        Ok(LeaseOutcome::NotHeldLocally) | Ok(LeaseOutcome::Stale) => false,
        Err(_) => params.core.holds(&params.lease),
    }
}
