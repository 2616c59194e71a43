use std::time::Duration;

use crate::errors::Result;
use crate::lock::{FencingToken, LockRecord};

/// Durable store of lock rows. Every operation is a single atomic step on one key.
///
/// Implementations report a stale or missing holder through `Ok(false)` and reserve `Err` for
/// the store being unreachable.
pub trait LockBackend: Send + Sync + 'static {
    /// Writes the row if the key is free or its row has expired.
    fn acquire(&self, key: &str, token: &FencingToken, ttl: Duration) -> Result<bool>;

    /// Clears the row if it is still held by `token`.
    fn release(&self, key: &str, token: &FencingToken) -> Result<bool>;

    /// Extends a live row held by `token` to `now + ttl` and increments its renew count.
    fn renew(&self, key: &str, token: &FencingToken, ttl: Duration) -> Result<bool>;

    /// Returns the live row for the key.
    fn is_held(&self, key: &str) -> Result<Option<LockRecord>>;

    /// Clears the row whoever holds it and returns the cleared live row.
    fn force_release(&self, key: &str) -> Result<Option<LockRecord>>;

    /// Lists all live rows.
    fn locks(&self) -> Result<Vec<LockRecord>>;
}
