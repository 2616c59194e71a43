#[macro_use]
extern crate log;
extern crate ha_coordinator;

mod clock;
mod memory_cluster_store;
mod memory_lock_backend;

pub use clock::{ManualClock, SystemClock};
pub use memory_cluster_store::MemoryClusterStore;
pub use memory_lock_backend::MemoryLockBackend;
