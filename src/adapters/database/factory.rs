//! Storage factory
//!
//! Builds one PostgreSQL pool and hands it out behind each storage trait.

use crate::adapters::database::traits::{
    AuditStore, ExtractionLogStore, PageAuditStore, RecordStore, ReconciliationStateStore,
};
use crate::adapters::postgresql::{
    PostgreSQLAuditStore, PostgreSQLClient, PostgreSQLLogStore, PostgreSQLPageAuditStore,
    PostgreSQLRecordStore, PostgreSQLStateStore,
};
use crate::config::PostgreSQLConfig;
use crate::domain::Result;
use std::sync::Arc;

/// All storage seams, sharing a single connection pool
#[derive(Clone)]
pub struct Stores {
    pub records: Arc<dyn RecordStore>,
    pub log: Arc<dyn ExtractionLogStore>,
    pub pages: Arc<dyn PageAuditStore>,
    pub reconciliation: Arc<dyn ReconciliationStateStore>,
    pub audit: Arc<dyn AuditStore>,
}

/// Create every store from the PostgreSQL configuration
///
/// The schema migrations are applied before the stores are returned.
///
/// # Errors
///
/// Returns an error if the pool cannot be created or the schema cannot be applied.
pub async fn create_stores(config: &PostgreSQLConfig) -> Result<Stores> {
    tracing::info!("Creating PostgreSQL stores");
    let client = Arc::new(PostgreSQLClient::new(config.clone()).await?);
    client.ensure_schema().await?;

    Ok(Stores {
        records: Arc::new(PostgreSQLRecordStore::new(client.clone())),
        log: Arc::new(PostgreSQLLogStore::new(client.clone())),
        pages: Arc::new(PostgreSQLPageAuditStore::new(client.clone())),
        reconciliation: Arc::new(PostgreSQLStateStore::new(client.clone())),
        audit: Arc::new(PostgreSQLAuditStore::new(client)),
    })
}
