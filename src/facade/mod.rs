pub mod migrator;

pub use migrator::{MigrationReport, Migrator};
