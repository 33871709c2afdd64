//! Append-only `page_audit` store

use crate::adapters::database::traits::PageAuditStore;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::core::pagination::PageAudit;
use crate::domain::{EntityKind, Result, RunId, TallyError};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

const INSERT_PAGE: &str = r#"
    INSERT INTO page_audit (
        run_id, entity, data_start, data_end, page, marker, page_size, records,
        status, http_status, response_hash, key_min, key_max, duration_ms, fetched_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
"#;

pub struct PostgreSQLPageAuditStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLPageAuditStore {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageAuditStore for PostgreSQLPageAuditStore {
    async fn append_pages(
        &self,
        run_id: RunId,
        entity: EntityKind,
        data_start: NaiveDate,
        data_end: NaiveDate,
        pages: &[PageAudit],
    ) -> Result<usize> {
        if pages.is_empty() {
            return Ok(0);
        }

        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| TallyError::Database(format!("Failed to open transaction: {}", e)))?;
        let statement = tx
            .prepare(INSERT_PAGE)
            .await
            .map_err(|e| TallyError::Database(format!("Failed to prepare page insert: {}", e)))?;

        let run_uuid = run_id.as_uuid();
        for page in pages {
            let page_no = page.page as i32;
            let page_size = page.page_size as i32;
            let records = page.records as i32;
            let http_status = page.http_status.map(i32::from);
            let duration_ms = page.duration_ms as i64;
            tx.execute(
                &statement,
                &[
                    &run_uuid,
                    &entity.as_str(),
                    &data_start,
                    &data_end,
                    &page_no,
                    &page.marker,
                    &page_size,
                    &records,
                    &page.status.as_str(),
                    &http_status,
                    &page.response_hash,
                    &page.key_min,
                    &page.key_max,
                    &duration_ms,
                    &page.fetched_at,
                ],
            )
            .await
            .map_err(|e| {
                TallyError::Database(format!(
                    "page_audit insert failed for {} page {}: {}",
                    entity, page.page, e
                ))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| TallyError::Database(format!("Failed to commit page trail: {}", e)))?;

        tracing::debug!(entity = %entity, run_id = %run_id, pages = pages.len(), "Page trail appended");
        Ok(pages.len())
    }
}
