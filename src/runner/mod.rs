// ============================================================================
// Migration Runner
// ============================================================================
//
// Orchestrates one plan run: read the persisted state, execute the path to
// the terminal state inside a single scope serialized by the migrations
// write lock, compare-and-set the new state, commit, then notify handlers.
// Any failure before the commit leaves the database and the state store
// exactly as they were.
//
// ============================================================================

pub mod runner;

pub use runner::{MigrationRunner, PostMigrationEvent};
