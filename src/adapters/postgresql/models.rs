//! Row mappings for PostgreSQL
//!
//! `extraction_log` rows are read through `PostgreSQLLogRow`, which keeps the
//! stored strings until they are checked against the domain enums.

use crate::core::reconciliation::{ExtractionLogEntry, RunStatus};
use crate::domain::{EntityKind, Result, RunId, TallyError};
use chrono::{DateTime, NaiveDate, Utc};
use std::str::FromStr;
use tokio_postgres::Row;
use uuid::Uuid;

/// Columns selected for every extraction log query
pub const LOG_COLUMNS: &str = "id, run_id, entity, window_start, window_end, data_start, data_end, \
     status, reason_code, records_extracted, pages_processed, message";

/// `extraction_log` row as stored
#[derive(Debug, Clone)]
pub struct PostgreSQLLogRow {
    pub id: i64,
    pub run_id: Uuid,
    pub entity: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub data_start: NaiveDate,
    pub data_end: NaiveDate,
    pub status: String,
    pub reason_code: String,
    pub records_extracted: i64,
    pub pages_processed: i64,
    pub message: Option<String>,
}

impl PostgreSQLLogRow {
    /// Read a row selected with [`LOG_COLUMNS`]
    pub fn from_row(row: &Row) -> Result<Self> {
        let get_err = |e: tokio_postgres::Error| {
            TallyError::Database(format!("Malformed extraction_log row: {}", e))
        };
        Ok(Self {
            id: row.try_get("id").map_err(get_err)?,
            run_id: row.try_get("run_id").map_err(get_err)?,
            entity: row.try_get("entity").map_err(get_err)?,
            window_start: row.try_get("window_start").map_err(get_err)?,
            window_end: row.try_get("window_end").map_err(get_err)?,
            data_start: row.try_get("data_start").map_err(get_err)?,
            data_end: row.try_get("data_end").map_err(get_err)?,
            status: row.try_get("status").map_err(get_err)?,
            reason_code: row.try_get("reason_code").map_err(get_err)?,
            records_extracted: row.try_get("records_extracted").map_err(get_err)?,
            pages_processed: row.try_get("pages_processed").map_err(get_err)?,
            message: row.try_get("message").map_err(get_err)?,
        })
    }

    /// Convert to the domain entry, resolving legacy status aliases
    pub fn to_domain(self) -> Result<ExtractionLogEntry> {
        let entity = EntityKind::from_str(&self.entity).map_err(TallyError::Database)?;
        let status = RunStatus::from_str(&self.status).map_err(TallyError::Database)?;

        Ok(ExtractionLogEntry {
            id: Some(self.id),
            run_id: RunId::from(self.run_id),
            entity,
            window_start: self.window_start,
            window_end: self.window_end,
            data_start: self.data_start,
            data_end: self.data_end,
            status,
            reason_code: self.reason_code,
            records_extracted: self.records_extracted,
            pages_processed: self.pages_processed,
            message: self.message.unwrap_or_default(),
        })
    }
}
