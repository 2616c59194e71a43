pub mod election_manager;
pub mod heartbeat_sender;
pub mod status_watcher;
