//! Storage abstraction layer
//!
//! Trait seams for entity rows, the extraction log, the page trail, loop
//! reconciliation state and audit queries, so the core can run against
//! PostgreSQL in production and in-memory fakes in tests.

pub mod factory;
pub mod traits;

pub use factory::{create_stores, Stores};
pub use traits::{
    AuditStore, ExtractionLogStore, OrphanStats, PageAuditStore, RecordStore,
    ReconciliationStateStore,
};
