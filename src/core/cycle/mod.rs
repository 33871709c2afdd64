//! Extraction cycles: every entity once, then the audit, then (in loop mode)
//! reconciliation of missed days

pub mod coordinator;
pub mod reconcile;
pub mod summary;

pub use coordinator::{CycleRange, ExtractionCycle};
pub use reconcile::{LoopReconciler, ReconciliationState, ReconciliationSummary};
pub use summary::{CycleError, CycleSummary};
