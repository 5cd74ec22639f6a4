pub mod cleaning;
pub mod loader;
pub mod order;
pub mod report;
pub mod verify;

pub use crate::domain::model::{
    CleaningResult, Record, Snapshot, TableOutcome, TableStatus, TableVerification, VerifiedCount,
};
pub use crate::domain::ports::{CleaningContext, CleaningRule, SnapshotSource, TargetStore};
pub use crate::utils::error::Result;
pub use order::DependencyOrder;
