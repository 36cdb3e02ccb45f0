pub mod engine;
pub mod inventory;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{ReconciliationEngine, WorkerContext, DEFAULT_SYNC_INTERVAL};
pub use inventory::{InventoryError, LocalInventory, WriteOutcome};
pub use types::{
    AlbumPlan, CycleReport, CycleStatus, EngineState, EngineStatus, SyncFailure, SyncFailureKind,
    SyncProgress,
};
