use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::common::clock::Clock;
use crate::leadership::LeaderElectionService;
use crate::lock::backend::LockBackend;
use crate::membership::NodeRole;
use crate::store::ClusterStore;

pub struct ElectionManagerParams<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub election: Arc<LeaderElectionService<B, S, C>>,
    pub node_id: String,
    pub election_interval: Duration,
}

pub fn run_leader_election<B, S, C>(
    params: ElectionManagerParams<B, S, C>,
    terminate_worker_rx: Receiver<()>,
) where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    info!("Node {} Election manager worker started", params.node_id);

    // The first round runs right away, later rounds every interval.
    let mut role = params.election.tick();
    let ticker = crossbeam_channel::tick(params.election_interval);
    loop {
        select!(
            recv(terminate_worker_rx) -> _ => {
                info!("Node {} Election manager worker stopped", params.node_id);
                return
            },
            recv(ticker) -> _ => {
                let next_role = params.election.tick();
                if next_role != role {
                    debug!("Node {} Role: {} -> {}", params.node_id, role, next_role);
                    role = next_role;
                }
            }
        );
    }
}
