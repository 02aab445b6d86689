// ============================================================================
// State Store
// ============================================================================
//
// Durable key-value persistence of each plan's last successfully reached
// state. The compare-and-set contract on `set_value` is what guards against
// two runners advancing the same plan: the write succeeds only while the
// stored value still equals what the caller read.
//
// ============================================================================

pub mod file;
pub mod memory;

use crate::core::Result;

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;

pub trait StateStore: Send + Sync {
    /// Last stored value for `key`, or `None` when the key has never been
    /// written. Callers treat `None` as the initial (empty) state.
    fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Compare-and-set: writes `new_value` only if the stored value still
    /// equals `expected_old` (a missing key matches the empty string).
    /// Returns `false` on a concurrent modification; the caller must abort.
    fn set_value(&self, key: &str, expected_old: &str, new_value: &str) -> Result<bool>;
}
