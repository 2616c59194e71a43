use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use ha_coordinator::{Clock, FencingToken, LockBackend, LockRecord, Result};

/// `locks` table kept in memory. Shared by every node of an in-process cluster.
#[derive(Debug)]
pub struct MemoryLockBackend<C: Clock> {
    clock: C,
    rows: Mutex<HashMap<String, LockRecord>>,
}

impl<C: Clock> MemoryLockBackend<C> {
    pub fn new(clock: C) -> MemoryLockBackend<C> {
        MemoryLockBackend {
            clock,
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Row for the key including an expired one.
    pub fn raw_row(&self, key: &str) -> Option<LockRecord> {
        self.rows.lock().get(key).cloned()
    }

    fn expires_at(&self, ttl: Duration) -> u64 {
        self.clock.now().saturating_add(ttl.as_millis() as u64)
    }
}

impl<C: Clock> LockBackend for MemoryLockBackend<C> {
    fn acquire(&self, key: &str, token: &FencingToken, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut rows = self.rows.lock();

        if let Some(row) = rows.get(key) {
            if !row.is_expired(now) {
                trace!("{} is busy", row);
                return Ok(false);
            }
        }

        rows.insert(
            key.to_string(),
            LockRecord {
                key: key.to_string(),
                token: token.clone(),
                acquired_at: now,
                expires_at: self.expires_at(ttl),
                renew_count: 0,
            },
        );
        Ok(true)
    }

    fn release(&self, key: &str, token: &FencingToken) -> Result<bool> {
        let mut rows = self.rows.lock();
        match rows.get(key) {
            Some(row) if row.token == *token => {
                rows.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn renew(&self, key: &str, token: &FencingToken, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = self.expires_at(ttl);
        match self.rows.lock().get_mut(key) {
            Some(row) if row.token == *token && !row.is_expired(now) => {
                row.expires_at = expires_at;
                row.renew_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn is_held(&self, key: &str) -> Result<Option<LockRecord>> {
        let now = self.clock.now();
        Ok(self
            .rows
            .lock()
            .get(key)
            .filter(|row| !row.is_expired(now))
            .cloned())
    }

    fn force_release(&self, key: &str) -> Result<Option<LockRecord>> {
        let now = self.clock.now();
        Ok(self.rows.lock().remove(key).filter(|row| !row.is_expired(now)))
    }

    fn locks(&self) -> Result<Vec<LockRecord>> {
        let now = self.clock.now();
        let mut live: Vec<LockRecord> = self
            .rows
            .lock()
            .values()
            .filter(|row| !row.is_expired(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(live)
    }
}
