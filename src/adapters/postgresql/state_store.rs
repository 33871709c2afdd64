//! Loop reconciliation state, kept as one JSONB row

use crate::adapters::database::traits::ReconciliationStateStore;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::core::cycle::ReconciliationState;
use crate::domain::{Result, TallyError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct PostgreSQLStateStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLStateStore {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReconciliationStateStore for PostgreSQLStateStore {
    async fn load(&self) -> Result<Option<ReconciliationState>> {
        let row = self
            .client
            .query_opt("SELECT state FROM loop_reconciliation_state WHERE id = 1", &[])
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let state: Value = row
            .try_get("state")
            .map_err(|e| TallyError::Database(format!("Unexpected state column: {}", e)))?;
        serde_json::from_value(state)
            .map(Some)
            .map_err(|e| TallyError::Database(format!("Unreadable reconciliation state: {}", e)))
    }

    async fn save(&self, state: &ReconciliationState) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.client
            .query(
                "INSERT INTO loop_reconciliation_state (id, state, updated_at) \
                 VALUES (1, $1, NOW()) \
                 ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at",
                &[&value],
            )
            .await?;

        tracing::debug!(pending = state.pending.len(), "Reconciliation state saved");
        Ok(())
    }
}
