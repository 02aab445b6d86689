// ============================================================================
// Transactional Scopes
// ============================================================================
//
// A scope is a nested transactional boundary: the outermost scope owns the
// physical database transaction, nested scopes share it, and the
// commit-or-rollback decision is made when the outermost scope is disposed.
// A single scope chain belongs to a single logical call context; the
// ambient stack lives in an explicit ScopeProvider instance, never in a
// process-wide global.
//
// ============================================================================

pub mod provider;
pub mod scope;

pub use provider::ScopeProvider;
pub use scope::Scope;
