use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::common::clock::Clock;
use crate::membership::ClusterMembership;
use crate::store::ClusterStore;

pub struct StatusWatcherParams<S: ClusterStore, C: Clock> {
    pub membership: Arc<ClusterMembership<S, C>>,
    pub status_check_interval: Duration,
}

pub fn watch_node_statuses<S: ClusterStore, C: Clock>(
    params: StatusWatcherParams<S, C>,
    terminate_worker_rx: Receiver<()>,
) {
    info!("Node {} Status watcher worker started", params.membership.node_id());
    let ticker = crossbeam_channel::tick(params.status_check_interval);
    loop {
        select!(
            recv(terminate_worker_rx) -> _ => {
                info!("Node {} Status watcher worker stopped", params.membership.node_id());
                return
            },
            recv(ticker) -> _ => {
                let transitions = params.membership.recompute_statuses();
                trace!(
                    "Node {} Status check: {} transition(s)",
                    params.membership.node_id(),
                    transitions.len()
                );
            }
        );
    }
}
