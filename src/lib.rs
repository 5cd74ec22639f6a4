pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{CsvSnapshotReader, PgTarget};
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{plan::MigrationPlan, LoaderConfig, Overrides};
pub use core::{cleaning::CleaningPlan, loader::Loader, report::RunReport, DependencyOrder};
pub use utils::error::{MigrateError, Result};
