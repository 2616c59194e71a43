use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::common::clock::Clock;
use crate::membership::ClusterMembership;
use crate::store::ClusterStore;

pub struct HeartbeatSenderParams<S: ClusterStore, C: Clock> {
    pub membership: Arc<ClusterMembership<S, C>>,
    pub heartbeat_interval: Duration,
}

pub fn send_heartbeats<S: ClusterStore, C: Clock>(
    params: HeartbeatSenderParams<S, C>,
    terminate_worker_rx: Receiver<()>,
) {
    info!("Node {} Heartbeat sender worker started", params.membership.node_id());
    let ticker = crossbeam_channel::tick(params.heartbeat_interval);
    loop {
        select!(
            recv(terminate_worker_rx) -> _ => {
                info!("Node {} Heartbeat sender worker stopped", params.membership.node_id());
                return
            },
            recv(ticker) -> _ => {
                if let Err(err) = params.membership.heartbeat() {
                    warn!("Node {} Heartbeat failed: {}", params.membership.node_id(), err);
                }
            }
        );
    }
}
