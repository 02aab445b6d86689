// ============================================================================
// Migration Steps
// ============================================================================
//
// A migration step is opaque, externally-built schema-change logic. The
// engine resolves a StepRef to an executable Migration through an explicit
// registry built once at startup — nothing is discovered by reflection or
// inspection at run time.
//
// ============================================================================

pub mod context;
pub mod registry;

use crate::core::{Result, StepRef};

pub use context::{Expression, MigrationContext};
pub use registry::MigrationRegistry;

/// One unit of schema-change logic, invoked by the runner inside the
/// active scope's transaction.
pub trait Migration {
    fn migrate(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;
}

impl std::fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Migration")
    }
}

/// Resolves step references to executable migrations.
pub trait MigrationBuilder {
    fn build(&self, step: &StepRef, ctx: &MigrationContext<'_>) -> Result<Box<dyn Migration>>;
}
