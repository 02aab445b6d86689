// ============================================================================
// Database Abstraction
// ============================================================================
//
// The migration engine never renders SQL itself; it drives an external
// database through these two traits. A scope owns exactly one
// DatabaseTransaction, and everything a migration run does — lock rows,
// entity rows, schema changes — goes through that transaction so a rollback
// discards all of it at once.
//
// ============================================================================

pub mod memory;

use serde_json::Value;

use crate::core::{IsolationLevel, Result};

pub use memory::InMemoryDatabase;

/// Opens physical database transactions. One factory is shared by every
/// scope provider talking to the same database.
pub trait DatabaseFactory: Send + Sync {
    /// Begin a new transaction at the requested isolation level.
    fn begin(&self, isolation: IsolationLevel) -> Result<Box<dyn DatabaseTransaction>>;
}

/// One open database transaction.
///
/// The lock-row methods touch only the advisory lock table: rows keyed by a
/// small integer id with a single value column used for its sign. They never
/// mutate schema.
pub trait DatabaseTransaction {
    fn isolation_level(&self) -> IsolationLevel;

    /// Read the value of a lock row, or `None` if the row does not exist.
    fn select_lock_row(&mut self, lock_id: i32) -> Result<Option<i64>>;

    /// Overwrite the value of a lock row. Blocks until any concurrent
    /// transaction holding the same row has ended; the write stays invisible
    /// to other transactions until commit.
    fn update_lock_row(&mut self, lock_id: i32, value: i64) -> Result<()>;

    /// Read a row, seeing this transaction's own pending writes.
    fn get(&mut self, key: &str) -> Result<Option<Value>>;

    /// Stage a row write.
    fn put(&mut self, key: &str, value: Value) -> Result<()>;

    /// Stage a row deletion.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Publish all pending work and release held lock rows.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard all pending work and release held lock rows.
    fn rollback(self: Box<Self>) -> Result<()>;
}
