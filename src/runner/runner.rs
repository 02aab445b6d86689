use crate::core::{IsolationLevel, MigrationError, Result, State, locks};
use crate::migration::MigrationBuilder;
use crate::plan::MigrationPlan;
use crate::scope::ScopeProvider;
use crate::store::StateStore;

/// Delivered to post-migration handlers after a run commits, whether or not
/// any steps actually ran.
#[derive(Debug, Clone)]
pub struct PostMigrationEvent {
    pub plan_name: String,
    /// Product tag carried by the plan, for handler-side filtering.
    pub product: Option<String>,
    pub final_state: State,
    /// False when the source state already was the terminal state.
    pub steps_ran: bool,
}

type PostMigrationHandler = Box<dyn Fn(&PostMigrationEvent) -> Result<()>>;

/// Executes migration plans exactly once per target state.
///
/// Handlers are an explicit list supplied to the runner instance, invoked
/// synchronously after commit; there is no static subscription mechanism.
#[derive(Default)]
pub struct MigrationRunner {
    handlers: Vec<PostMigrationHandler>,
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a post-migration handler. Handler errors are logged, never
    /// propagated: they must not undo an already-committed upgrade.
    pub fn add_post_migration<F>(&mut self, handler: F)
    where
        F: Fn(&PostMigrationEvent) -> Result<()> + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Runs `plan` from its persisted state to its terminal state.
    ///
    /// The whole run executes inside one scope: on success the scope commits
    /// and the state store records the terminal state; on any failure the
    /// scope rolls back and nothing is persisted. Concurrent runners are
    /// serialized by the migrations write lock, and a stale runner that
    /// lost the race fails the state store's compare-and-set.
    pub fn execute(
        &self,
        plan: &MigrationPlan,
        provider: &ScopeProvider,
        builder: &dyn MigrationBuilder,
        store: &dyn StateStore,
    ) -> Result<State> {
        // an invalid plan is a programming error; refuse to start
        let terminal = plan.validate()?;

        let source = store.get_value(plan.name())?.unwrap_or_default();
        tracing::info!(
            plan = %plan.name(),
            source = %source,
            terminal = %terminal,
            "starting migration run"
        );

        let mut scope = provider.create_scope(IsolationLevel::RepeatableRead)?;
        scope.write_lock(&[locks::MIGRATIONS])?;

        let final_state = plan.execute(&scope, &source, builder)?;
        let steps_ran = final_state != source;

        if steps_ran && !store.set_value(plan.name(), &source, &final_state)? {
            // another runner advanced the plan; roll back via scope drop
            return Err(MigrationError::ConcurrentStateChange(
                plan.name().to_string(),
            ));
        }

        scope.complete()?;
        scope.dispose()?;
        tracing::info!(plan = %plan.name(), state = %final_state, steps_ran, "migration run committed");

        let event = PostMigrationEvent {
            plan_name: plan.name().to_string(),
            product: plan.product().map(str::to_string),
            final_state: final_state.clone(),
            steps_ran,
        };
        for handler in &self.handlers {
            if let Err(e) = handler(&event) {
                tracing::error!(plan = %plan.name(), error = %e, "post-migration handler failed");
            }
        }

        Ok(final_state)
    }
}
