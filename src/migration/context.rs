use crate::core::{MigrationError, Result};
use crate::db::DatabaseTransaction;
use crate::scope::Scope;

/// A handle for one schema-change expression being built through the
/// external fluent DSL. It must be handed back to
/// [`MigrationContext::complete_expression`] before the step returns or
/// another expression starts.
#[must_use = "an expression must be completed, or the step fails"]
#[derive(Debug)]
pub struct Expression {
    _private: (),
}

/// Execution context handed to each migration step: access to the active
/// scope's transaction, plus eager tracking of unfinished schema-change
/// expressions.
pub struct MigrationContext<'a> {
    scope: &'a Scope,
    plan_name: &'a str,
    expression_open: bool,
    steps_executed: usize,
}

impl<'a> MigrationContext<'a> {
    pub(crate) fn new(scope: &'a Scope, plan_name: &'a str) -> Self {
        Self {
            scope,
            plan_name,
            expression_open: false,
            steps_executed: 0,
        }
    }

    pub fn plan_name(&self) -> &str {
        self.plan_name
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Runs `f` against the transaction the migration executes in.
    pub fn with_database<T>(
        &self,
        f: impl FnOnce(&mut dyn DatabaseTransaction) -> Result<T>,
    ) -> Result<T> {
        self.scope.with_database(f)
    }

    /// Starts building a schema-change expression. Starting a second one
    /// while the first is still open is an error, raised here rather than
    /// when the step ends.
    pub fn begin_expression(&mut self) -> Result<Expression> {
        if self.expression_open {
            return Err(MigrationError::ExpressionInProgress);
        }
        self.expression_open = true;
        Ok(Expression { _private: () })
    }

    /// Finalizes an expression, consuming its handle.
    pub fn complete_expression(&mut self, expression: Expression) {
        let _ = expression;
        self.expression_open = false;
    }

    /// Whether a step left an expression unfinished.
    pub fn has_open_expression(&self) -> bool {
        self.expression_open
    }

    pub(crate) fn record_step(&mut self) {
        self.steps_executed += 1;
    }

    /// Number of steps executed so far in this run.
    pub fn steps_executed(&self) -> usize {
        self.steps_executed
    }
}
