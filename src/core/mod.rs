pub mod error;
pub mod types;

pub use error::{MigrationError, Result};
pub use types::{INITIAL_STATE, IsolationLevel, State, StepRef, locks};
