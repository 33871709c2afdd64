//! Remote source abstractions
//!
//! Pagination drivers see the remote APIs only through these traits. Each call is
//! one page; retry and throttling already happened inside the request channel, so
//! an `Err` here is final for that page.

pub mod data_export;
pub mod graphql;
pub mod rest;

use crate::domain::{ApiError, EntitySpec, ExtractionWindow, RecordKey};
use async_trait::async_trait;
use serde_json::Value;

pub use data_export::DataExportSource;
pub use graphql::GraphQlSource;
pub use rest::RestSource;

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, Default)]
pub struct CursorPage {
    pub records: Vec<Value>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// One page of a pointer-paginated listing
#[derive(Debug, Clone, Default)]
pub struct PointerPage {
    pub records: Vec<Value>,
    /// Marker for the following request; `None` ends the listing
    pub next_marker: Option<String>,
}

/// Listing paged by an opaque continuation token
#[async_trait]
pub trait CursorSource: Send + Sync {
    async fn fetch_page(
        &self,
        spec: &'static EntitySpec,
        window: &ExtractionWindow,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<CursorPage, ApiError>;
}

/// Listing paged by the last seen identifier
#[async_trait]
pub trait PointerSource: Send + Sync {
    async fn fetch_page(
        &self,
        spec: &'static EntitySpec,
        window: &ExtractionWindow,
        marker: Option<&str>,
        page_size: usize,
    ) -> Result<PointerPage, ApiError>;
}

/// Single synchronous range query
#[async_trait]
pub trait BulkSource: Send + Sync {
    async fn fetch_range(
        &self,
        spec: &'static EntitySpec,
        window: &ExtractionWindow,
        max_records: usize,
    ) -> Result<Vec<Value>, ApiError>;
}

/// Secondary per-record lookup used by the enrichment pipeline
#[async_trait]
pub trait LookupSource: Send + Sync {
    /// Fetches the detail payload for one record; `Ok(None)` when the remote has none
    async fn lookup(
        &self,
        spec: &'static EntitySpec,
        key: &RecordKey,
    ) -> Result<Option<Value>, ApiError>;
}

/// Pulls the record array out of a response that is either a bare array or an
/// object wrapping it under `data`
pub(crate) fn records_from(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ApiError::InvalidResponse(format!(
                "Expected 'data' to be an array, got {}",
                json_kind(&other)
            ))),
        },
        other => Err(ApiError::InvalidResponse(format!(
            "Expected array or object, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_from_shapes() {
        assert_eq!(records_from(json!([1, 2])).unwrap().len(), 2);
        assert_eq!(records_from(json!({"data": [1]})).unwrap().len(), 1);
        assert!(records_from(json!({"data": null})).unwrap().is_empty());
        assert!(records_from(json!({"data": "x"})).is_err());
        assert!(records_from(json!("x")).is_err());
    }
}
