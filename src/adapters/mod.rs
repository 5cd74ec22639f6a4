// Adapters layer: concrete implementations for external systems (snapshot files, target database).

pub mod postgres;
pub mod snapshot;

pub use postgres::PgTarget;
pub use snapshot::CsvSnapshotReader;
