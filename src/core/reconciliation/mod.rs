//! Status reconciliation and the append-only extraction log
//!
//! Every run is classified once, from three signals checked in order:
//! pagination completeness, the persisted count and the invalid-record ratio.
//! The result is appended to the extraction log, which the audit engine
//! treats as the only record of what a run claimed.

pub mod log;
pub mod runner;
pub mod status;
pub mod taxonomy;

pub use log::{
    build_message, extraction_failure, group_thousands, message_counter, persistence_failure,
    ExtractionLogEntry, RunCounters,
};
pub use runner::{ExtractionRunner, RunReport};
pub use status::{ReasonCode, RunStatus};
pub use taxonomy::{reconcile, InvalidTolerance, Reconciliation, RunSignals};
