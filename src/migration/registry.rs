use std::collections::HashMap;

use super::{Migration, MigrationBuilder, MigrationContext};
use crate::core::{MigrationError, Result, StepRef};

type MigrationFactory = Box<dyn Fn() -> Box<dyn Migration> + Send + Sync>;

/// Explicit step registry: `StepRef → factory`, built once by the embedding
/// application and handed to the runner.
#[derive(Default)]
pub struct MigrationRegistry {
    factories: HashMap<StepRef, MigrationFactory>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for a step. Re-registering a step replaces the
    /// previous factory.
    pub fn register<F>(&mut self, step: impl Into<StepRef>, factory: F)
    where
        F: Fn() -> Box<dyn Migration> + Send + Sync + 'static,
    {
        self.factories.insert(step.into(), Box::new(factory));
    }

    pub fn contains(&self, step: &StepRef) -> bool {
        self.factories.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl MigrationBuilder for MigrationRegistry {
    fn build(&self, step: &StepRef, _ctx: &MigrationContext<'_>) -> Result<Box<dyn Migration>> {
        let factory = self
            .factories
            .get(step)
            .ok_or_else(|| MigrationError::UnknownStep(step.to_string()))?;
        Ok(factory())
    }
}
