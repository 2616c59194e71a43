use std::time::Duration;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Time source shared by every component of a node.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

pub fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

pub fn add(at: Timestamp, duration: Duration) -> Timestamp {
    at.saturating_add(millis(duration))
}

/// Elapsed time between `earlier` and `now`, zero when the clock went backwards.
pub fn elapsed(earlier: Timestamp, now: Timestamp) -> Duration {
    Duration::from_millis(now.saturating_sub(earlier))
}
