// ============================================================================
// Migration Plans
// ============================================================================
//
// A plan is a named, validated directed chain of states connected by
// migration steps. Every state has at most one outgoing transition, so the
// "graph" is a forest of simple chains that meet only through explicit
// splices; path resolution is a deterministic single-successor walk, never
// a search.
//
// ============================================================================

pub mod plan;

pub use plan::{MigrationPlan, Transition};
