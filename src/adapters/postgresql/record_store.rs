//! Entity row upserts

use crate::adapters::database::traits::RecordStore;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::core::extraction::PreparedRecord;
use crate::domain::{ColumnType, EntitySpec, Result, TallyError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// Builds the upsert statement for an entity.
///
/// Parameters are the projected columns in registry order, then `metadata`,
/// `payload_hash` and the timestamp column.
pub fn upsert_sql(spec: &EntitySpec) -> String {
    let projected: Vec<&str> = spec.projected_columns().map(|c| c.name).collect();
    let keys: Vec<&str> = spec.key_columns.iter().map(|c| c.name).collect();

    let mut columns = projected.clone();
    columns.extend(["metadata", "payload_hash", spec.timestamp_column]);

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    let updates: Vec<String> = spec
        .extra_columns
        .iter()
        .map(|c| c.name)
        .chain(["metadata", "payload_hash", spec.timestamp_column])
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
        spec.table,
        columns.join(", "),
        placeholders.join(", "),
        keys.join(", "),
        updates.join(", ")
    )
}

fn row_params(
    spec: &EntitySpec,
    record: &PreparedRecord,
    stamped_at: DateTime<Utc>,
) -> Vec<Box<dyn ToSql + Sync + Send>> {
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(record.columns.len() + 3);
    for (column, value) in spec.projected_columns().zip(&record.columns) {
        match column.column_type {
            ColumnType::BigInt => {
                params.push(Box::new(value.as_deref().and_then(|v| v.parse::<i64>().ok())))
            }
            ColumnType::Text => params.push(Box::new(value.clone())),
        }
    }
    params.push(Box::new(record.payload.clone()));
    params.push(Box::new(record.payload_hash.clone()));
    params.push(Box::new(stamped_at));
    params
}

pub struct PostgreSQLRecordStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLRecordStore {
    pub fn new(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordStore for PostgreSQLRecordStore {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn upsert(
        &self,
        spec: &'static EntitySpec,
        records: &[PreparedRecord],
        stamped_at: DateTime<Utc>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = upsert_sql(spec);
        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| TallyError::Database(format!("Failed to open transaction: {}", e)))?;
        let statement = tx
            .prepare(&sql)
            .await
            .map_err(|e| TallyError::Database(format!("Failed to prepare upsert: {}", e)))?;

        let mut written = 0usize;
        for record in records {
            let params = row_params(spec, record, stamped_at);
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();
            let affected = tx.execute(&statement, &refs).await.map_err(|e| {
                TallyError::Database(format!(
                    "Upsert into {} failed for key {}: {}",
                    spec.table, record.key, e
                ))
            })?;
            written += affected as usize;
        }

        tx.commit()
            .await
            .map_err(|e| TallyError::Database(format!("Failed to commit upsert: {}", e)))?;

        tracing::debug!(
            entity = %spec.kind,
            table = spec.table,
            rows = written,
            "Upsert committed"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extraction::prepare_batch;
    use crate::domain::EntityKind;
    use serde_json::json;

    #[test]
    fn test_upsert_sql_for_composite_key() {
        let sql = upsert_sql(EntityKind::Manifests.spec());
        assert_eq!(
            sql,
            "INSERT INTO manifests (sequence_code, unique_identifier, pick_sequence_code, metadata, payload_hash, extracted_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (sequence_code, unique_identifier) DO UPDATE SET \
             pick_sequence_code = EXCLUDED.pick_sequence_code, metadata = EXCLUDED.metadata, \
             payload_hash = EXCLUDED.payload_hash, extracted_at = EXCLUDED.extracted_at"
        );
    }

    #[test]
    fn test_upsert_sql_uses_entity_timestamp_column() {
        let sql = upsert_sql(EntityKind::Users.spec());
        assert!(sql.starts_with("INSERT INTO dim_users (user_id, name, metadata, payload_hash, updated_at)"));
        assert!(sql.contains("ON CONFLICT (user_id)"));
    }

    #[test]
    fn test_row_params_match_placeholders() {
        let spec = EntityKind::Freights.spec();
        let batch = prepare_batch(spec, vec![json!({"id": 5, "accountingCreditId": "77"})]);
        let params = row_params(spec, &batch.records[0], Utc::now());
        assert_eq!(params.len(), upsert_sql(spec).matches('$').count());
    }
}
