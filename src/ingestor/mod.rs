//! Sync pipeline stages and the orchestrator driving them

pub mod barrier;
pub mod catalog;
pub mod mirrors;
pub mod orchestrator;
pub mod reconcile;
pub mod state_manager;
pub mod version_diff;

pub use barrier::PendingSet;
pub use catalog::CatalogSyncer;
pub use mirrors::MirrorRegistry;
pub use orchestrator::SyncOrchestrator;
pub use reconcile::{ApplyOutcome, DayWindow, ReconciliationEngine};
pub use state_manager::{CycleKind, SyncEvent, SyncEventReceiver, SyncStateManager};
pub use version_diff::{SyncWindow, VersionDiffEngine};
