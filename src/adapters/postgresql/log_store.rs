//! Append-only `extraction_log` store

use crate::adapters::database::traits::ExtractionLogStore;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{PostgreSQLLogRow, LOG_COLUMNS};
use crate::core::reconciliation::{ExtractionLogEntry, RunStatus};
use crate::domain::{EntityKind, Result, TallyError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

pub struct PostgreSQLLogStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLLogStore {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionLogStore for PostgreSQLLogStore {
    async fn append(&self, entry: &ExtractionLogEntry) -> Result<i64> {
        let query = r#"
            INSERT INTO extraction_log (
                run_id, entity, window_start, window_end, data_start, data_end,
                status, reason_code, records_extracted, pages_processed, message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
        "#;

        let rows = self
            .client
            .query(
                query,
                &[
                    &entry.run_id.as_uuid(),
                    &entry.entity.as_str(),
                    &entry.window_start,
                    &entry.window_end,
                    &entry.data_start,
                    &entry.data_end,
                    &entry.status.storage_code(),
                    &entry.reason_code,
                    &entry.records_extracted,
                    &entry.pages_processed,
                    &entry.message,
                ],
            )
            .await?;

        let id = rows
            .first()
            .map(|row| row.get::<_, i64>("id"))
            .ok_or_else(|| TallyError::Database("extraction_log insert returned no id".to_string()))?;

        tracing::debug!(
            entity = %entry.entity,
            status = %entry.status,
            log_id = id,
            "Extraction log row appended"
        );
        Ok(id)
    }

    async fn latest_overlapping(
        &self,
        entity: EntityKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<ExtractionLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM extraction_log \
             WHERE entity = $1 AND window_end >= $2 AND window_start <= $3 \
             ORDER BY window_end DESC, id DESC LIMIT 1"
        );
        let row = self
            .client
            .query_opt(&query, &[&entity.as_str(), &start, &end])
            .await?;
        row.map(|r| PostgreSQLLogRow::from_row(&r)?.to_domain())
            .transpose()
    }

    async fn latest_complete_on_day(
        &self,
        entity: EntityKind,
        day: NaiveDate,
    ) -> Result<Option<ExtractionLogEntry>> {
        let query = format!(
            "SELECT {LOG_COLUMNS} FROM extraction_log \
             WHERE entity = $1 AND status = $2 AND data_start <= $3 AND data_end >= $3 \
             ORDER BY window_end DESC, id DESC LIMIT 1"
        );
        let row = self
            .client
            .query_opt(
                &query,
                &[&entity.as_str(), &RunStatus::Complete.storage_code(), &day],
            )
            .await?;
        row.map(|r| PostgreSQLLogRow::from_row(&r)?.to_domain())
            .transpose()
    }

    async fn recent(&self, entity: Option<EntityKind>, limit: i64) -> Result<Vec<ExtractionLogEntry>> {
        let rows = match entity {
            Some(kind) => {
                let query = format!(
                    "SELECT {LOG_COLUMNS} FROM extraction_log WHERE entity = $1 \
                     ORDER BY window_end DESC, id DESC LIMIT $2"
                );
                self.client.query(&query, &[&kind.as_str(), &limit]).await?
            }
            None => {
                let query = format!(
                    "SELECT {LOG_COLUMNS} FROM extraction_log \
                     ORDER BY window_end DESC, id DESC LIMIT $1"
                );
                self.client.query(&query, &[&limit]).await?
            }
        };

        rows.iter()
            .map(|r| PostgreSQLLogRow::from_row(r)?.to_domain())
            .collect()
    }
}
