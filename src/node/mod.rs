use std::sync::Arc;

use crate::admin::ClusterAdministrator;
use crate::common::clock::Clock;
use crate::common::{run_worker, WorkerPool};
use crate::errors::Result;
use crate::leadership::LeaderElectionService;
use crate::lock::backend::LockBackend;
use crate::lock::service::DistributedLockService;
use crate::membership::ClusterMembership;
use crate::store::ClusterStore;
use crate::task_ha::TaskHaManager;
use crate::workers::election_manager::{run_leader_election, ElectionManagerParams};
use crate::workers::heartbeat_sender::{send_heartbeats, HeartbeatSenderParams};
use crate::workers::status_watcher::{watch_node_statuses, StatusWatcherParams};

pub mod configuration;

use configuration::{HaConfiguration, NodeConfiguration};

/// The coordination services of one node, shared with its workers.
pub struct NodeServices<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub locks: Arc<DistributedLockService<B, C>>,
    pub membership: Arc<ClusterMembership<S, C>>,
    pub election: Arc<LeaderElectionService<B, S, C>>,
    pub tasks: Arc<TaskHaManager<B, S, C>>,
    store: Arc<S>,
    clock: C,
    config: HaConfiguration,
}

impl<B, S, C> Clone for NodeServices<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    fn clone(&self) -> Self {
        NodeServices {
            locks: self.locks.clone(),
            membership: self.membership.clone(),
            election: self.election.clone(),
            tasks: self.tasks.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config,
        }
    }
}

impl<B, S, C> NodeServices<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    /// Wires the services without starting any worker.
    pub fn new(node_config: NodeConfiguration<B, S, C>) -> Result<NodeServices<B, S, C>> {
        node_config.ha.validate()?;

        let NodeConfiguration {
            identity,
            ha,
            lock_backend,
            cluster_store,
            clock,
        } = node_config;

        let locks = Arc::new(DistributedLockService::new(
            &identity.node_id,
            lock_backend,
            clock.clone(),
            ha.backend_timeout,
        ));
        let membership = Arc::new(ClusterMembership::new(
            identity,
            cluster_store.clone(),
            clock.clone(),
            ha,
        ));
        let election = Arc::new(LeaderElectionService::new(
            locks.clone(),
            membership.clone(),
            cluster_store.clone(),
            clock.clone(),
            ha,
        ));
        let tasks = Arc::new(TaskHaManager::new(
            locks.clone(),
            membership.clone(),
            clock.clone(),
            ha,
        ));

        Ok(NodeServices {
            locks,
            membership,
            election,
            tasks,
            store: cluster_store,
            clock,
            config: ha,
        })
    }

    pub fn node_id(&self) -> &str {
        self.locks.node_id()
    }

    pub fn config(&self) -> &HaConfiguration {
        &self.config
    }

    pub fn administrator(&self) -> ClusterAdministrator<B, S, C> {
        ClusterAdministrator {
            locks: self.locks.clone(),
            membership: self.membership.clone(),
            election: self.election.clone(),
            tasks: self.tasks.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config,
        }
    }

    /// Resigns leadership, releases task locks and then every other lock, stops renewals.
    /// Failures are logged and left to lapse at their ttl.
    pub fn release_everything(&self) {
        self.election.shutdown();

        let released_tasks = self.tasks.release_all();
        let released_locks = self.locks.release_all();
        self.locks.stop_renewals();

        info!(
            "Node {} Released {} task lock(s) and {} other lock(s)",
            self.node_id(),
            released_tasks,
            released_locks.len()
        );
    }
}

/// A running node: its services plus the heartbeat, status and election workers.
pub struct HaNode<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    services: NodeServices<B, S, C>,
    workers: WorkerPool,
}

impl<B, S, C> HaNode<B, S, C>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    pub fn services(&self) -> &NodeServices<B, S, C> {
        &self.services
    }

    pub fn node_id(&self) -> &str {
        self.services.node_id()
    }

    pub fn administrator(&self) -> ClusterAdministrator<B, S, C> {
        self.services.administrator()
    }

    /// Graceful shutdown.
    pub fn shutdown(self) {
        info!("Node {} Shutting down", self.node_id());
        self.workers.terminate();
        self.workers.join();
        self.services.release_everything();
    }

    /// Stops the workers and renewals without releasing anything, as if the process died.
    pub fn halt(self) {
        warn!("Node {} Halting without releasing locks", self.node_id());
        self.workers.terminate();
        self.workers.join();
        self.services.locks.stop_renewals();
    }
}

/// Registers the node, then starts its background workers.
pub fn start<B, S, C>(node_config: NodeConfiguration<B, S, C>) -> Result<HaNode<B, S, C>>
where
    B: LockBackend,
    S: ClusterStore,
    C: Clock,
{
    let services = NodeServices::new(node_config)?;
    let config = *services.config();

    if let Err(err) = services.membership.heartbeat() {
        warn!("Node {} Initial heartbeat failed: {}", services.node_id(), err);
    }
    services.membership.recompute_statuses();

    let heartbeat_worker = run_worker(
        send_heartbeats,
        HeartbeatSenderParams {
            membership: services.membership.clone(),
            heartbeat_interval: config.heartbeat_interval,
        },
    );

    let status_worker = run_worker(
        watch_node_statuses,
        StatusWatcherParams {
            membership: services.membership.clone(),
            status_check_interval: config.status_check_interval,
        },
    );

    let election_worker = run_worker(
        run_leader_election,
        ElectionManagerParams {
            election: services.election.clone(),
            node_id: services.node_id().to_string(),
            election_interval: config.election_interval,
        },
    );

    info!("Node {} Started", services.node_id());
    Ok(HaNode {
        services,
        workers: WorkerPool::new(vec![heartbeat_worker, status_worker, election_worker]),
    })
}
