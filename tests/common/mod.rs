//! In-memory stores and scripted sources shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tally::adapters::database::{
    AuditStore, ExtractionLogStore, OrphanStats, PageAuditStore, RecordStore,
    ReconciliationStateStore,
};
use tally::adapters::sources::{CursorPage, CursorSource, PointerPage, PointerSource};
use tally::core::cycle::ReconciliationState;
use tally::core::extraction::PreparedRecord;
use tally::core::pagination::PageAudit;
use tally::core::reconciliation::{ExtractionLogEntry, RunStatus};
use tally::domain::{
    ApiError, EntityKind, EntitySpec, ExtractionWindow, ReferenceRule, Result, RunId, TallyError,
};

/// Records with sequential integer ids starting at `first`
pub fn records(first: i64, count: usize) -> Vec<Value> {
    (0..count as i64)
        .map(|i| json!({"id": first + i, "document": format!("D-{}", first + i)}))
        .collect()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Entity rows keyed by table and natural key
#[derive(Default)]
pub struct MemoryRecordStore {
    rows: Mutex<HashMap<(&'static str, String), String>>,
    /// Rows silently skipped per upsert, to simulate a diverging store
    drop_per_batch: usize,
    fail: bool,
}

impl MemoryRecordStore {
    pub fn dropping(rows: usize) -> Self {
        Self {
            drop_per_batch: rows,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| *t == table)
            .count()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(
        &self,
        spec: &'static EntitySpec,
        records: &[PreparedRecord],
        _stamped_at: DateTime<Utc>,
    ) -> Result<usize> {
        if self.fail {
            return Err(TallyError::Database("connection reset".to_string()));
        }
        let keep = records.len().saturating_sub(self.drop_per_batch);
        let mut rows = self.rows.lock().unwrap();
        for record in &records[..keep] {
            rows.insert(
                (spec.table, record.key.as_str().to_string()),
                record.payload_hash.clone(),
            );
        }
        Ok(keep)
    }
}

/// Append-only log held in a vector
#[derive(Default)]
pub struct MemoryLogStore {
    rows: Mutex<Vec<ExtractionLogEntry>>,
}

impl MemoryLogStore {
    pub fn entries(&self) -> Vec<ExtractionLogEntry> {
        self.rows.lock().unwrap().clone()
    }

    /// Seeds a row as if a run had just finished
    pub fn seed(&self, entity: EntityKind, status: RunStatus, records: i64, message: &str) {
        let now = Utc::now();
        let entry = ExtractionLogEntry {
            id: None,
            run_id: RunId::generate(),
            entity,
            window_start: now - Duration::minutes(5),
            window_end: now,
            data_start: now.date_naive(),
            data_end: now.date_naive(),
            status,
            reason_code: "OK".to_string(),
            records_extracted: records,
            pages_processed: 1,
            message: message.to_string(),
        };
        self.rows.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl ExtractionLogStore for MemoryLogStore {
    async fn append(&self, entry: &ExtractionLogEntry) -> Result<i64> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        let mut stored = entry.clone();
        stored.id = Some(id);
        rows.push(stored);
        Ok(id)
    }

    async fn latest_overlapping(
        &self,
        entity: EntityKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<ExtractionLogEntry>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.entity == entity && e.window_start <= end && e.window_end >= start)
            .cloned())
    }

    async fn latest_complete_on_day(
        &self,
        entity: EntityKind,
        day: NaiveDate,
    ) -> Result<Option<ExtractionLogEntry>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| {
                e.entity == entity
                    && e.status == RunStatus::Complete
                    && e.data_start <= day
                    && day <= e.data_end
            })
            .cloned())
    }

    async fn recent(&self, entity: Option<EntityKind>, limit: i64) -> Result<Vec<ExtractionLogEntry>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| entity.map_or(true, |k| e.entity == k))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Page trail rows tagged with their run and entity
#[derive(Default)]
pub struct MemoryPageAuditStore {
    rows: Mutex<Vec<(RunId, EntityKind, PageAudit)>>,
}

impl MemoryPageAuditStore {
    pub fn pages(&self) -> Vec<(RunId, EntityKind, PageAudit)> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageAuditStore for MemoryPageAuditStore {
    async fn append_pages(
        &self,
        run_id: RunId,
        entity: EntityKind,
        _data_start: NaiveDate,
        _data_end: NaiveDate,
        pages: &[PageAudit],
    ) -> Result<usize> {
        let mut rows = self.rows.lock().unwrap();
        rows.extend(pages.iter().cloned().map(|p| (run_id, entity, p)));
        Ok(pages.len())
    }
}

/// Reconciliation state kept between cycles, with a save counter
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<ReconciliationState>>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn seeded(state: ReconciliationState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    pub fn current(&self) -> Option<ReconciliationState> {
        self.state.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl ReconciliationStateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<ReconciliationState>> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save(&self, state: &ReconciliationState) -> Result<()> {
        *self.state.lock().unwrap() = Some(state.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

/// Canned answers for every audit query
#[derive(Default)]
pub struct MemoryAuditStore {
    pub missing_tables: HashSet<&'static str>,
    pub missing_columns: HashMap<EntityKind, Vec<String>>,
    pub counts: HashMap<EntityKind, i64>,
    pub null_keys: HashMap<EntityKind, i64>,
    pub duplicates: HashMap<EntityKind, i64>,
    pub orphans: HashMap<&'static str, OrphanStats>,
    pub non_sequential: bool,
    pub gaps: i64,
    pub fail_counts: bool,
}

impl MemoryAuditStore {
    pub fn with_count(mut self, entity: EntityKind, count: i64) -> Self {
        self.counts.insert(entity, count);
        self
    }

    pub fn with_orphans(mut self, rule: &'static str, orphans: i64, children_with_fk: i64) -> Self {
        self.orphans.insert(
            rule,
            OrphanStats {
                orphans,
                children_with_fk,
            },
        );
        self
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(!self.missing_tables.contains(table))
    }

    async fn missing_columns(&self, spec: &'static EntitySpec) -> Result<Vec<String>> {
        Ok(self.missing_columns.get(&spec.kind).cloned().unwrap_or_default())
    }

    async fn count_in_window(
        &self,
        spec: &'static EntitySpec,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<i64> {
        if self.fail_counts {
            return Err(TallyError::Database("relation is locked".to_string()));
        }
        Ok(self.counts.get(&spec.kind).copied().unwrap_or(0))
    }

    async fn count_null_keys(
        &self,
        spec: &'static EntitySpec,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self.null_keys.get(&spec.kind).copied().unwrap_or(0))
    }

    async fn count_duplicate_keys(
        &self,
        spec: &'static EntitySpec,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self.duplicates.get(&spec.kind).copied().unwrap_or(0))
    }

    async fn orphan_stats(
        &self,
        rule: &'static ReferenceRule,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<OrphanStats> {
        Ok(self.orphans.get(rule.name).copied().unwrap_or_default())
    }

    async fn orphan_sample(
        &self,
        rule: &'static ReferenceRule,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>> {
        let orphans = self.orphans.get(rule.name).map_or(0, |s| s.orphans);
        Ok((1..=orphans.min(limit)).map(|i| (9000 + i).to_string()).collect())
    }

    async fn ids_sequential(
        &self,
        _spec: &'static EntitySpec,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(!self.non_sequential)
    }

    async fn count_id_gaps(&self, _spec: &'static EntitySpec, _since: DateTime<Utc>) -> Result<i64> {
        Ok(self.gaps)
    }
}

/// Cursor source replaying scripted pages, recording the cursors it was asked for
#[derive(Default)]
pub struct ScriptedCursor {
    pages: Mutex<VecDeque<std::result::Result<CursorPage, ApiError>>>,
    pub requested: Mutex<Vec<Option<String>>>,
}

impl ScriptedCursor {
    pub fn new(pages: Vec<std::result::Result<CursorPage, ApiError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }
}

pub fn cursor_page(records: Vec<Value>, end_cursor: Option<&str>, has_next_page: bool) -> CursorPage {
    CursorPage {
        records,
        end_cursor: end_cursor.map(str::to_string),
        has_next_page,
    }
}

#[async_trait]
impl CursorSource for ScriptedCursor {
    async fn fetch_page(
        &self,
        _spec: &'static EntitySpec,
        _window: &ExtractionWindow,
        cursor: Option<&str>,
        _page_size: usize,
    ) -> std::result::Result<CursorPage, ApiError> {
        self.requested.lock().unwrap().push(cursor.map(str::to_string));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CursorPage::default()))
    }
}

/// Pointer source replaying scripted pages
#[derive(Default)]
pub struct ScriptedPointer {
    pages: Mutex<VecDeque<std::result::Result<PointerPage, ApiError>>>,
    pub requested: Mutex<Vec<Option<String>>>,
}

impl ScriptedPointer {
    pub fn new(pages: Vec<std::result::Result<PointerPage, ApiError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// A source that lists `records` in pages of `page_size`, keyed by last id
    pub fn paged(records: Vec<Value>, page_size: usize) -> Self {
        let mut pages = Vec::new();
        let chunks: Vec<Vec<Value>> = records.chunks(page_size).map(|c| c.to_vec()).collect();
        for chunk in chunks {
            let next_marker = chunk.last().map(|r| r["id"].to_string());
            pages.push(Ok(PointerPage {
                records: chunk,
                next_marker,
            }));
        }
        pages.push(Ok(PointerPage::default()));
        Self::new(pages)
    }
}

pub fn pointer_page(records: Vec<Value>, next_marker: Option<&str>) -> PointerPage {
    PointerPage {
        records,
        next_marker: next_marker.map(str::to_string),
    }
}

#[async_trait]
impl PointerSource for ScriptedPointer {
    async fn fetch_page(
        &self,
        _spec: &'static EntitySpec,
        _window: &ExtractionWindow,
        marker: Option<&str>,
        _page_size: usize,
    ) -> std::result::Result<PointerPage, ApiError> {
        self.requested.lock().unwrap().push(marker.map(str::to_string));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PointerPage::default()))
    }
}
