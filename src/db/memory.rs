// ============================================================================
// In-Memory Database
// ============================================================================
//
// Executable stand-in for the external database. Transactions buffer their
// writes and publish them atomically on commit; lock rows behave like real
// advisory row locks: an update holds the row until the transaction ends,
// blocking any concurrent updater.
//
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use serde_json::Value;

use super::{DatabaseFactory, DatabaseTransaction};
use crate::core::{IsolationLevel, MigrationError, Result, locks};

struct Shared {
    rows: Mutex<HashMap<String, Value>>,
    lock_rows: Mutex<HashMap<i32, i64>>,
    // Lock rows currently held by an open transaction, paired with `released`
    // so waiters can block until the holder ends.
    held: Mutex<HashSet<i32>>,
    released: Condvar,
}

impl Shared {
    fn acquire_row(&self, lock_id: i32) -> Result<()> {
        let mut held = self.held.lock()?;
        while held.contains(&lock_id) {
            held = self
                .released
                .wait(held)
                .map_err(|e| MigrationError::LockPoisoned(e.to_string()))?;
        }
        held.insert(lock_id);
        Ok(())
    }

    fn release_rows(&self, lock_ids: &[i32]) {
        if let Ok(mut held) = self.held.lock() {
            for id in lock_ids {
                held.remove(id);
            }
        }
        self.released.notify_all();
    }
}

/// A shared in-memory database. Cloning is cheap and every clone sees the
/// same data, so a clone per "server instance" models concurrent processes.
#[derive(Clone)]
pub struct InMemoryDatabase {
    shared: Arc<Shared>,
}

impl InMemoryDatabase {
    /// Creates an empty database with the well-known system lock rows
    /// already seeded, as a freshly installed schema would have them.
    pub fn new() -> Self {
        let mut lock_rows = HashMap::new();
        lock_rows.insert(locks::MIGRATIONS, 1);
        lock_rows.insert(locks::KEY_VALUES, 1);

        Self {
            shared: Arc::new(Shared {
                rows: Mutex::new(HashMap::new()),
                lock_rows: Mutex::new(lock_rows),
                held: Mutex::new(HashSet::new()),
                released: Condvar::new(),
            }),
        }
    }

    /// Insert an application-defined lock row.
    pub fn insert_lock_row(&self, lock_id: i32, value: i64) -> Result<()> {
        self.shared.lock_rows.lock()?.insert(lock_id, value);
        Ok(())
    }

    /// Committed value of a lock row.
    pub fn lock_value(&self, lock_id: i32) -> Result<Option<i64>> {
        Ok(self.shared.lock_rows.lock()?.get(&lock_id).copied())
    }

    /// Committed value of a data row.
    pub fn committed(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.shared.rows.lock()?.get(key).cloned())
    }

    /// Number of committed data rows.
    pub fn row_count(&self) -> Result<usize> {
        Ok(self.shared.rows.lock()?.len())
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseFactory for InMemoryDatabase {
    fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn DatabaseTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            isolation,
            pending_rows: HashMap::new(),
            pending_lock_values: HashMap::new(),
            held_locks: Vec::new(),
            done: false,
        }))
    }
}

pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    isolation: IsolationLevel,
    // None marks a pending deletion.
    pending_rows: HashMap<String, Option<Value>>,
    pending_lock_values: HashMap<i32, i64>,
    held_locks: Vec<i32>,
    done: bool,
}

impl InMemoryTransaction {
    fn end(&mut self) {
        self.done = true;
        self.shared.release_rows(&self.held_locks);
        self.held_locks.clear();
    }
}

impl DatabaseTransaction for InMemoryTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    fn select_lock_row(&mut self, lock_id: i32) -> Result<Option<i64>> {
        if let Some(value) = self.pending_lock_values.get(&lock_id) {
            return Ok(Some(*value));
        }
        Ok(self.shared.lock_rows.lock()?.get(&lock_id).copied())
    }

    fn update_lock_row(&mut self, lock_id: i32, value: i64) -> Result<()> {
        if !self.shared.lock_rows.lock()?.contains_key(&lock_id) {
            return Err(MigrationError::LockObjectMissing(lock_id));
        }
        if !self.held_locks.contains(&lock_id) {
            self.shared.acquire_row(lock_id)?;
            self.held_locks.push(lock_id);
        }
        self.pending_lock_values.insert(lock_id, value);
        Ok(())
    }

    fn get(&mut self, key: &str) -> Result<Option<Value>> {
        if let Some(pending) = self.pending_rows.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.shared.rows.lock()?.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Value) -> Result<()> {
        self.pending_rows.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.pending_rows.insert(key.to_string(), None);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        {
            let mut rows = self.shared.rows.lock()?;
            for (key, value) in self.pending_rows.drain() {
                match value {
                    Some(v) => {
                        rows.insert(key, v);
                    }
                    None => {
                        rows.remove(&key);
                    }
                }
            }
        }
        {
            let mut lock_rows = self.shared.lock_rows.lock()?;
            for (id, value) in self.pending_lock_values.drain() {
                lock_rows.insert(id, value);
            }
        }
        self.end();
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.pending_rows.clear();
        self.pending_lock_values.clear();
        self.end();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.done {
            self.shared.release_rows(&self.held_locks);
        }
    }
}
