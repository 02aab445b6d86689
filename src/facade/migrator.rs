use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{Result, State};
use crate::db::DatabaseFactory;
use crate::migration::{Migration, MigrationRegistry};
use crate::plan::MigrationPlan;
use crate::runner::{MigrationRunner, PostMigrationEvent};
use crate::scope::ScopeProvider;
use crate::store::StateStore;

/// Outcome of one plan run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub plan_name: String,
    pub initial_state: State,
    pub final_state: State,
    pub steps_ran: bool,
    pub elapsed: Duration,
}

/// High-level entry point bundling a database, a state store, a step
/// registry and post-migration handlers.
///
/// This is the recommended way to run migration plans in applications; the
/// lower-level pieces (`ScopeProvider`, `MigrationRunner`) stay available
/// for embedders that need finer control.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use rustmigrate::db::InMemoryDatabase;
/// use rustmigrate::store::InMemoryStateStore;
/// use rustmigrate::plan::MigrationPlan;
/// use rustmigrate::{Migrator, Migration, MigrationContext, Result};
///
/// struct CreateTables;
///
/// impl Migration for CreateTables {
///     fn migrate(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
///         ctx.with_database(|tx| tx.put("schema:users", serde_json::json!({"v": 1})))
///     }
/// }
///
/// # fn main() -> Result<()> {
/// let mut migrator = Migrator::new(
///     Arc::new(InMemoryDatabase::new()),
///     Arc::new(InMemoryStateStore::new()),
/// );
/// migrator.register_step("create-tables", || Box::new(CreateTables));
///
/// let plan = MigrationPlan::new("default").from("").to("aaa", "create-tables");
/// let report = migrator.run(&plan)?;
/// assert_eq!(report.final_state, "aaa");
/// assert!(report.steps_ran);
/// # Ok(())
/// # }
/// ```
pub struct Migrator {
    database: Arc<dyn DatabaseFactory>,
    store: Arc<dyn StateStore>,
    registry: MigrationRegistry,
    runner: MigrationRunner,
}

impl Migrator {
    pub fn new(database: Arc<dyn DatabaseFactory>, store: Arc<dyn StateStore>) -> Self {
        Self {
            database,
            store,
            registry: MigrationRegistry::new(),
            runner: MigrationRunner::new(),
        }
    }

    /// Registers a migration step factory.
    pub fn register_step<F>(&mut self, step: impl Into<crate::core::StepRef>, factory: F)
    where
        F: Fn() -> Box<dyn Migration> + Send + Sync + 'static,
    {
        self.registry.register(step, factory);
    }

    /// Registers a post-migration handler.
    pub fn on_post_migration<F>(&mut self, handler: F)
    where
        F: Fn(&PostMigrationEvent) -> Result<()> + 'static,
    {
        self.runner.add_post_migration(handler);
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Runs a plan to its terminal state. Each run gets its own
    /// call-context-scoped `ScopeProvider`.
    pub fn run(&self, plan: &MigrationPlan) -> Result<MigrationReport> {
        let started = Instant::now();
        let initial_state = self.store.get_value(plan.name())?.unwrap_or_default();

        let provider = ScopeProvider::new(Arc::clone(&self.database));
        let final_state = self
            .runner
            .execute(plan, &provider, &self.registry, self.store.as_ref())?;

        Ok(MigrationReport {
            plan_name: plan.name().to_string(),
            steps_ran: final_state != initial_state,
            initial_state,
            final_state,
            elapsed: started.elapsed(),
        })
    }
}
