//! PostgreSQL storage
//!
//! Entity tables, the append-only extraction log, the page trail, loop
//! reconciliation state and the audit queries.

pub mod audit_store;
pub mod client;
pub mod log_store;
pub mod models;
pub mod page_audit_store;
pub mod record_store;
pub mod state_store;

pub use audit_store::PostgreSQLAuditStore;
pub use client::PostgreSQLClient;
pub use log_store::PostgreSQLLogStore;
pub use models::PostgreSQLLogRow;
pub use page_audit_store::PostgreSQLPageAuditStore;
pub use record_store::PostgreSQLRecordStore;
pub use state_store::PostgreSQLStateStore;
