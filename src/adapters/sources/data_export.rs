//! Bulk range-query source over the report export API

use super::{records_from, BulkSource};
use crate::adapters::http::ApiClient;
use crate::domain::{ApiError, EntityKind, EntitySpec, ExtractionWindow};
use async_trait::async_trait;
use serde_json::json;

/// Report table and date column searched for a bulk entity
fn search_target(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Manifests => ("manifests", "service_date"),
        EntityKind::Quotes => ("quotes", "requested_at"),
        EntityKind::CargoLocations => ("freights", "service_at"),
        EntityKind::Payables => ("accounting_debits", "issue_date"),
        EntityKind::CustomerInvoices => ("freights", "service_at"),
        _ => ("records", "created_at"),
    }
}

#[derive(Debug, Clone)]
pub struct DataExportSource {
    client: ApiClient,
}

impl DataExportSource {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BulkSource for DataExportSource {
    async fn fetch_range(
        &self,
        spec: &'static EntitySpec,
        window: &ExtractionWindow,
        max_records: usize,
    ) -> Result<Vec<serde_json::Value>, ApiError> {
        let (table, date_field) = search_target(spec.kind);
        let body = json!({
            "search": { table: { date_field: format!("{} - {}", window.start(), window.end()) } },
            "page": "1",
            "per": max_records.to_string(),
        });

        let path = format!("api/analytics/reports/{}/data", spec.source);
        let label = format!("data-export:{}", spec.kind);
        let response = self.client.post_json(&label, &path, &body).await?;
        records_from(response)
    }
}
