use serde::{Deserialize, Serialize};

/// An opaque checkpoint identifier marking how much of a plan has been
/// applied. The empty string means "nothing applied yet".
pub type State = String;

/// The state a plan starts from when nothing has been applied.
pub const INITIAL_STATE: &str = "";

/// Identifies executable migration logic. Resolved to a concrete
/// [`Migration`](crate::migration::Migration) through a registry at run
/// time; the engine itself treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRef(String);

impl StepRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepRef {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for StepRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Transaction isolation levels, ordered weakest to strongest.
///
/// Advisory locking requires at least [`IsolationLevel::RepeatableRead`]:
/// anything weaker lets two writers flip the same lock row without ever
/// conflicting, which defeats the whole point of the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Well-known advisory lock object identifiers.
///
/// System locks use small negative ids so they can never collide with
/// application-defined lock objects, which use positive ids.
pub mod locks {
    /// Serializes concurrent migration runners across server instances.
    pub const MIGRATIONS: i32 = -331;

    /// Guards the key-value store holding per-plan migration state.
    pub const KEY_VALUES: i32 = -332;
}
