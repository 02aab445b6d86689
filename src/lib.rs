// ============================================================================
// rustmigrate
// ============================================================================
//
// A schema-migration execution engine: validated plans of named states with
// attached migration steps, executed atomically inside nested transactional
// scopes serialized by advisory row locks. A multi-step upgrade either
// fully applies or leaves the database exactly as it was, across process
// restarts, concurrent server instances, and partial failures.
//
// ============================================================================

pub mod core;
pub mod db;
pub mod facade;
pub mod migration;
pub mod plan;
pub mod runner;
pub mod scope;
pub mod store;
pub mod uow;

// Re-export main types for convenience
pub use crate::core::{INITIAL_STATE, IsolationLevel, MigrationError, Result, State, StepRef, locks};
pub use facade::{MigrationReport, Migrator};
pub use migration::{Expression, Migration, MigrationBuilder, MigrationContext, MigrationRegistry};
pub use plan::{MigrationPlan, Transition};
pub use runner::{MigrationRunner, PostMigrationEvent};
pub use scope::{Scope, ScopeProvider};
pub use uow::{OperationKind, Repository, UnitOfWork};
