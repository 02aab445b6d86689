use thiserror::Error;

use crate::core::types::IsolationLevel;

#[derive(Error, Debug)]
pub enum MigrationError {
    // ------------------------------------------------------------------
    // Plan authoring / validation
    // ------------------------------------------------------------------
    #[error("Duplicate transition: state '{0}' already has an outgoing transition")]
    DuplicateTransition(String),

    #[error("Self transition: state '{0}' cannot transition to itself")]
    SelfTransition(String),

    #[error("Multiple terminal states in plan: {0:?}")]
    MultipleHeads(Vec<String>),

    #[error("Cycle detected in plan at state '{0}'")]
    Cycle(String),

    #[error("Cannot splice: no forward path from '{from}' to '{to}'")]
    DisconnectedSplice { from: String, to: String },

    #[error("State '{state}' is not part of plan '{plan}'")]
    UnknownState { plan: String, state: String },

    // ------------------------------------------------------------------
    // Scope / locking
    // ------------------------------------------------------------------
    #[error("Isolation level {required} required, but transaction is {actual}")]
    InsufficientIsolation {
        required: IsolationLevel,
        actual: IsolationLevel,
    },

    #[error("Lock object {0} does not exist in the lock table")]
    LockObjectMissing(i32),

    #[error("Scope being disposed is not the ambient scope")]
    NotAmbient,

    #[error("Scope has already been disposed")]
    ScopeDisposed,

    #[error("No ambient transaction is active")]
    NoAmbientTransaction,

    // ------------------------------------------------------------------
    // Step execution
    // ------------------------------------------------------------------
    #[error("No migration registered for step '{0}'")]
    UnknownStep(String),

    #[error("Migration step failed: {0}")]
    Step(#[from] anyhow::Error),

    #[error("A schema-change expression is already being built")]
    ExpressionInProgress,

    #[error("Migration step '{0}' returned with an unfinished schema-change expression")]
    IncompleteExpression(String),

    #[error("State for plan '{0}' was changed by a concurrent migration")]
    ConcurrentStateChange(String),

    // ------------------------------------------------------------------
    // Infrastructure
    // ------------------------------------------------------------------
    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl<T> From<std::sync::PoisonError<T>> for MigrationError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned(err.to_string())
    }
}
