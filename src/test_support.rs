use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::common::clock::{self, Clock, Timestamp};
use crate::errors::{new_err, ErrorKind, Result};
use crate::leadership::{FailoverRecord, LeaderHandoff, LeaderLease};
use crate::lock::backend::LockBackend;
use crate::lock::{FencingToken, LockRecord};
use crate::membership::{ClusterNode, NodeHeartbeat, NodeRole, NodeStatus, Session};
use crate::store::ClusterStore;

#[derive(Clone, Debug)]
pub struct MockClock {
    now: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new(now: Timestamp) -> MockClock {
        MockClock {
            now: Arc::new(AtomicU64::new(now)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.fetch_add(clock::millis(duration), Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

fn unavailable<T>() -> Result<T> {
    new_err(
        ErrorKind::BackendUnavailable,
        "Mock storage is switched off".to_string(),
        String::new(),
    )
}

pub struct MockBackend {
    clock: MockClock,
    available: AtomicBool,
    rows: Mutex<HashMap<String, LockRecord>>,
}

impl MockBackend {
    pub fn new(clock: MockClock) -> MockBackend {
        MockBackend {
            clock,
            available: AtomicBool::new(true),
            rows: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Puts a row in place regardless of the current holder.
    pub fn overwrite(&self, key: &str, token: FencingToken, ttl: Duration) {
        let now = self.clock.now();
        self.rows.lock().insert(
            key.to_string(),
            LockRecord {
                key: key.to_string(),
                token,
                acquired_at: now,
                expires_at: clock::add(now, ttl),
                renew_count: 0,
            },
        );
    }

    pub fn renew_count(&self, key: &str) -> u32 {
        self.rows.lock().get(key).map_or(0, |row| row.renew_count)
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            unavailable()
        }
    }
}

impl LockBackend for MockBackend {
    fn acquire(&self, key: &str, token: &FencingToken, ttl: Duration) -> Result<bool> {
        self.check()?;
        let now = self.clock.now();
        let mut rows = self.rows.lock();
        if let Some(row) = rows.get(key) {
            if !row.is_expired(now) {
                return Ok(false);
            }
        }

        rows.insert(
            key.to_string(),
            LockRecord {
                key: key.to_string(),
                token: token.clone(),
                acquired_at: now,
                expires_at: clock::add(now, ttl),
                renew_count: 0,
            },
        );
        Ok(true)
    }

    fn release(&self, key: &str, token: &FencingToken) -> Result<bool> {
        self.check()?;
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
        self.check()?;
        let now = self.clock.now();
        match self.rows.lock().get_mut(key) {
            Some(row) if row.token == *token && !row.is_expired(now) => {
                row.expires_at = clock::add(now, ttl);
                row.renew_count += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn is_held(&self, key: &str) -> Result<Option<LockRecord>> {
        self.check()?;
        let now = self.clock.now();
        Ok(self
            .rows
            .lock()
            .get(key)
            .filter(|row| !row.is_expired(now))
            .cloned())
    }

    fn force_release(&self, key: &str) -> Result<Option<LockRecord>> {
        self.check()?;
        let now = self.clock.now();
        Ok(self.rows.lock().remove(key).filter(|row| !row.is_expired(now)))
    }

    fn locks(&self) -> Result<Vec<LockRecord>> {
        self.check()?;
        let now = self.clock.now();
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|row| !row.is_expired(now))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct StoreTables {
    nodes: HashMap<String, ClusterNode>,
    sessions: HashMap<String, Session>,
    leader_lease: Option<LeaderLease>,
    leader_handoff: Option<LeaderHandoff>,
    failover_records: Vec<FailoverRecord>,
}

pub struct MockStore {
    available: AtomicBool,
    tables: Mutex<StoreTables>,
}

impl Default for MockStore {
    fn default() -> Self {
        MockStore {
            available: AtomicBool::new(true),
            tables: Mutex::new(StoreTables::default()),
        }
    }
}

impl MockStore {
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            unavailable()
        }
    }
}

impl ClusterStore for MockStore {
    fn record_heartbeat(&self, heartbeat: &NodeHeartbeat) -> Result<ClusterNode> {
        self.check()?;
        let mut tables = self.tables.lock();
        let node = tables
            .nodes
            .entry(heartbeat.node_id.clone())
            .or_insert_with(|| ClusterNode {
                id: heartbeat.node_id.clone(),
                address: heartbeat.address.clone(),
                role: NodeRole::Follower,
                status: NodeStatus::Online,
                last_heartbeat: heartbeat.at,
                joined_at: heartbeat.at,
                metadata: HashMap::new(),
                enabled: true,
                weight: heartbeat.weight,
            });
        node.address = heartbeat.address.clone();
        node.metadata = heartbeat.metadata.clone();
        node.weight = heartbeat.weight;
        node.last_heartbeat = heartbeat.at;
        Ok(node.clone())
    }

    fn nodes(&self) -> Result<Vec<ClusterNode>> {
        self.check()?;
        Ok(self.tables.lock().nodes.values().cloned().collect())
    }

    fn save_node_state(&self, node_id: &str, status: NodeStatus, role: NodeRole) -> Result<bool> {
        self.check()?;
        match self.tables.lock().nodes.get_mut(node_id) {
            Some(node) => {
                node.status = status;
                node.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_node_enabled(&self, node_id: &str, enabled: bool) -> Result<bool> {
        self.check()?;
        match self.tables.lock().nodes.get_mut(node_id) {
            Some(node) => {
                node.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn refresh_session(&self, session: &Session) -> Result<()> {
        self.check()?;
        self.tables
            .lock()
            .sessions
            .insert(session.node_id.clone(), session.clone());
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<Session>> {
        self.check()?;
        Ok(self.tables.lock().sessions.values().cloned().collect())
    }

    fn leader_lease(&self) -> Result<Option<LeaderLease>> {
        self.check()?;
        Ok(self.tables.lock().leader_lease.clone())
    }

    fn replace_leader_lease(&self, expected_term: u64, lease: &LeaderLease) -> Result<bool> {
        self.check()?;
        let mut tables = self.tables.lock();
        let term = tables.leader_lease.as_ref().map_or(0, |current| current.term);
        if term != expected_term {
            return Ok(false);
        }
        tables.leader_lease = Some(lease.clone());
        Ok(true)
    }

    fn extend_leader_lease(
        &self,
        leader_node_id: &str,
        term: u64,
        expires_at: Timestamp,
    ) -> Result<bool> {
        self.check()?;
        match self.tables.lock().leader_lease.as_mut() {
            Some(lease) if lease.leader_node_id == leader_node_id && lease.term == term => {
                lease.expires_at = expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn leader_handoff(&self) -> Result<Option<LeaderHandoff>> {
        self.check()?;
        Ok(self.tables.lock().leader_handoff.clone())
    }

    fn set_leader_handoff(&self, handoff: Option<LeaderHandoff>) -> Result<()> {
        self.check()?;
        self.tables.lock().leader_handoff = handoff;
        Ok(())
    }

    fn append_failover(&self, mut record: FailoverRecord) -> Result<u64> {
        self.check()?;
        let mut tables = self.tables.lock();
        record.id = tables.failover_records.len() as u64 + 1;
        let id = record.id;
        tables.failover_records.push(record);
        Ok(id)
    }

    fn failover_records(&self) -> Result<Vec<FailoverRecord>> {
        self.check()?;
        Ok(self.tables.lock().failover_records.clone())
    }
}
