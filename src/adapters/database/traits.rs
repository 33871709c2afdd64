//! Storage abstraction traits
//!
//! These traits are the seams between the extraction core and PostgreSQL.
//! Every table and column name passed through them comes from the compile-time
//! entity registry.

use crate::core::cycle::ReconciliationState;
use crate::core::extraction::PreparedRecord;
use crate::core::pagination::PageAudit;
use crate::core::reconciliation::ExtractionLogEntry;
use crate::domain::{EntityKind, EntitySpec, ReferenceRule, Result, RunId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Entity row storage
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Test the database connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Upsert a deduplicated batch inside one transaction
    ///
    /// Every row is stamped with `stamped_at` in the entity's timestamp column.
    ///
    /// # Returns
    ///
    /// Returns the number of rows inserted or updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is committed then.
    async fn upsert(
        &self,
        spec: &'static EntitySpec,
        records: &[PreparedRecord],
        stamped_at: DateTime<Utc>,
    ) -> Result<usize>;
}

/// Append-only extraction log
#[async_trait]
pub trait ExtractionLogStore: Send + Sync {
    /// Append one row and return its store-assigned id
    async fn append(&self, entry: &ExtractionLogEntry) -> Result<i64>;

    /// Most recent row for `entity` whose run overlaps `[start, end]`
    async fn latest_overlapping(
        &self,
        entity: EntityKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<ExtractionLogEntry>>;

    /// Most recent complete row for `entity` whose data range covers `day`
    async fn latest_complete_on_day(
        &self,
        entity: EntityKind,
        day: NaiveDate,
    ) -> Result<Option<ExtractionLogEntry>>;

    /// Most recent rows, newest first, optionally for one entity
    async fn recent(&self, entity: Option<EntityKind>, limit: i64) -> Result<Vec<ExtractionLogEntry>>;
}

/// Append-only trail of page requests
#[async_trait]
pub trait PageAuditStore: Send + Sync {
    /// Append the pages requested by one run
    ///
    /// # Returns
    ///
    /// Returns the number of rows written.
    async fn append_pages(
        &self,
        run_id: RunId,
        entity: EntityKind,
        data_start: NaiveDate,
        data_end: NaiveDate,
        pages: &[PageAudit],
    ) -> Result<usize>;
}

/// Persisted state of loop-mode reconciliation
#[async_trait]
pub trait ReconciliationStateStore: Send + Sync {
    /// The saved state, or `None` before the first save
    async fn load(&self) -> Result<Option<ReconciliationState>>;

    /// Replace the saved state
    async fn save(&self, state: &ReconciliationState) -> Result<()>;
}

/// Orphan counters for one reference rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanStats {
    /// Child rows whose non-null foreign key has no parent
    pub orphans: i64,
    /// Child rows with a non-null foreign key
    pub children_with_fk: i64,
}

impl OrphanStats {
    pub fn percent(&self) -> f64 {
        self.orphans as f64 * 100.0 / self.children_with_fk.max(1) as f64
    }
}

/// Read-only queries used by the audit engine
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Required columns of `spec` that the table lacks
    async fn missing_columns(&self, spec: &'static EntitySpec) -> Result<Vec<String>>;

    /// Rows whose timestamp column lies in `[start, end]`
    async fn count_in_window(
        &self,
        spec: &'static EntitySpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;

    /// Rows in the window with any natural-key column null
    async fn count_null_keys(
        &self,
        spec: &'static EntitySpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;

    /// Natural-key groups appearing more than once in the window
    async fn count_duplicate_keys(
        &self,
        spec: &'static EntitySpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;

    /// Orphan counters for children stamped in `[start, end]`
    async fn orphan_stats(
        &self,
        rule: &'static ReferenceRule,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<OrphanStats>;

    /// First orphan foreign-key values, sorted
    async fn orphan_sample(
        &self,
        rule: &'static ReferenceRule,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>>;

    /// Whether the integer ids stamped in `[since, until)` form an unbroken run
    async fn ids_sequential(
        &self,
        spec: &'static EntitySpec,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<bool>;

    /// Missing positions between the smallest and largest id stamped since `since`
    async fn count_id_gaps(&self, spec: &'static EntitySpec, since: DateTime<Utc>) -> Result<i64>;
}
