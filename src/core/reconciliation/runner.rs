//! Runs one extraction end to end and records it in the extraction log

use super::log::{extraction_failure, persistence_failure, ExtractionLogEntry, RunCounters};
use super::status::{ReasonCode, RunStatus};
use super::taxonomy::{reconcile, InvalidTolerance, Reconciliation, RunSignals};
use crate::adapters::database::{ExtractionLogStore, PageAuditStore};
use crate::core::pagination::PageAudit;
use crate::core::extraction::EntityExtractor;
use crate::domain::{EntityKind, ExtractionWindow, Result, RunId, TallyError};
use crate::{log_extraction_complete, log_extraction_start};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Structured result of one run. A non-complete status is data, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub entity: EntityKind,
    pub status: RunStatus,
    pub reason: ReasonCode,
    pub counters: RunCounters,
    pub log_id: Option<i64>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// Extract, persist, reconcile, append.
pub struct ExtractionRunner {
    log: Arc<dyn ExtractionLogStore>,
    page_audit: Option<Arc<dyn PageAuditStore>>,
    tolerance: InvalidTolerance,
}

struct RunContext<'a> {
    run_id: RunId,
    window: &'a ExtractionWindow,
    started_at: DateTime<Utc>,
    timer: Instant,
}

impl ExtractionRunner {
    pub fn new(log: Arc<dyn ExtractionLogStore>, tolerance: InvalidTolerance) -> Self {
        Self {
            log,
            page_audit: None,
            tolerance,
        }
    }

    /// Also append each run's page trail
    pub fn with_page_audit(mut self, store: Arc<dyn PageAuditStore>) -> Self {
        self.page_audit = Some(store);
        self
    }

    pub fn tolerance(&self) -> InvalidTolerance {
        self.tolerance
    }

    /// Runs `extractor` over `window` and appends exactly one log row.
    ///
    /// # Errors
    ///
    /// Shutdown, persistence failures and log-append failures propagate after
    /// the failure row (when one could be written). Any other extraction error
    /// is recorded as `API_ERROR` and returned as a report.
    pub async fn run(
        &self,
        extractor: &dyn EntityExtractor,
        window: &ExtractionWindow,
    ) -> Result<RunReport> {
        let kind = extractor.kind();
        let ctx = RunContext {
            run_id: RunId::generate(),
            window,
            started_at: Utc::now(),
            timer: Instant::now(),
        };
        log_extraction_start!(kind, window.start(), window.end());

        let mut outcome = match extractor.extract(window).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let counters = RunCounters {
                    duration_ms: ctx.timer.elapsed().as_millis() as u64,
                    ..RunCounters::default()
                };
                let error = e.to_string();
                tracing::error!(entity = %kind, error = %error, "Extraction failed");
                let log_id = self
                    .append_failure(&ctx, kind, extraction_failure(), &counters, &error)
                    .await;

                if matches!(e, TallyError::Interrupted(_)) {
                    return Err(e);
                }
                let failure = extraction_failure();
                return Ok(RunReport {
                    run_id: ctx.run_id,
                    entity: kind,
                    status: failure.status,
                    reason: failure.reason,
                    counters,
                    log_id,
                    error: Some(error),
                });
            }
        };

        self.append_page_trail(&ctx, kind, outcome.take_page_trail()).await;

        let interruption = outcome.interruption();
        let remote_error = outcome.error().map(str::to_string);
        let received = outcome.record_count();
        let pages = outcome.pages_processed();

        let metrics = match extractor.persist(outcome.into_records()).await {
            Ok(metrics) => metrics,
            Err(e) => {
                let counters = RunCounters {
                    received,
                    pages,
                    duration_ms: ctx.timer.elapsed().as_millis() as u64,
                    ..RunCounters::default()
                };
                tracing::error!(entity = %kind, error = %e, "Persistence failed");
                self.append_failure(&ctx, kind, persistence_failure(), &counters, &e.to_string())
                    .await;
                return Err(e);
            }
        };

        let counters = RunCounters {
            received,
            unique: metrics.unique_records,
            persisted: metrics.records_persisted,
            invalid: metrics.invalid_records,
            pages,
            duration_ms: ctx.timer.elapsed().as_millis() as u64,
        };
        let signals = RunSignals {
            interruption,
            received,
            metrics,
        };
        let reconciliation = reconcile(&signals, &self.tolerance);

        let entry = ExtractionLogEntry::from_run(
            ctx.run_id,
            kind,
            ctx.started_at,
            Utc::now(),
            window.start(),
            window.end(),
            reconciliation,
            &counters,
        );
        let log_id = self.log.append(&entry).await?;

        tracing::info!(entity = %kind, run_id = %ctx.run_id, "{}", entry.diag_line(&counters));
        log_extraction_complete!(
            kind,
            reconciliation.status,
            counters.received,
            counters.persisted,
            ctx.timer.elapsed()
        );

        Ok(RunReport {
            run_id: ctx.run_id,
            entity: kind,
            status: reconciliation.status,
            reason: reconciliation.reason,
            counters,
            log_id: Some(log_id),
            error: remote_error,
        })
    }

    /// A trail that cannot be written is logged and does not change the run
    async fn append_page_trail(&self, ctx: &RunContext<'_>, kind: EntityKind, pages: Vec<PageAudit>) {
        let Some(store) = &self.page_audit else {
            return;
        };
        if pages.is_empty() {
            return;
        }
        if let Err(e) = store
            .append_pages(ctx.run_id, kind, ctx.window.start(), ctx.window.end(), &pages)
            .await
        {
            tracing::warn!(
                entity = %kind,
                run_id = %ctx.run_id,
                pages = pages.len(),
                error = %e,
                "Could not record page trail"
            );
        }
    }

    async fn append_failure(
        &self,
        ctx: &RunContext<'_>,
        kind: EntityKind,
        reconciliation: Reconciliation,
        counters: &RunCounters,
        error: &str,
    ) -> Option<i64> {
        let entry = ExtractionLogEntry::from_failure(
            ctx.run_id,
            kind,
            ctx.started_at,
            Utc::now(),
            ctx.window.start(),
            ctx.window.end(),
            reconciliation,
            counters,
            error,
        );
        tracing::info!(entity = %kind, run_id = %ctx.run_id, "{}", entry.diag_line(counters));

        match self.log.append(&entry).await {
            Ok(id) => Some(id),
            Err(append_err) => {
                tracing::error!(
                    entity = %kind,
                    error = %append_err,
                    "Could not record failed run in the extraction log"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extraction::{ExtractionOutcome, InterruptionReason, SaveMetrics};
    use crate::core::pagination::PageStatus;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLog {
        rows: Mutex<Vec<ExtractionLogEntry>>,
    }

    #[async_trait]
    impl ExtractionLogStore for MemoryLog {
        async fn append(&self, entry: &ExtractionLogEntry) -> Result<i64> {
            let mut rows = self.rows.lock().unwrap();
            rows.push(entry.clone());
            Ok(rows.len() as i64)
        }

        async fn latest_overlapping(
            &self,
            _entity: EntityKind,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Option<ExtractionLogEntry>> {
            Ok(None)
        }

        async fn latest_complete_on_day(
            &self,
            _entity: EntityKind,
            _day: NaiveDate,
        ) -> Result<Option<ExtractionLogEntry>> {
            Ok(None)
        }

        async fn recent(&self, _entity: Option<EntityKind>, _limit: i64) -> Result<Vec<ExtractionLogEntry>> {
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct MemoryPages {
        rows: Mutex<Vec<(RunId, EntityKind, u32)>>,
        fail: bool,
    }

    #[async_trait]
    impl PageAuditStore for MemoryPages {
        async fn append_pages(
            &self,
            run_id: RunId,
            entity: EntityKind,
            _data_start: NaiveDate,
            _data_end: NaiveDate,
            pages: &[PageAudit],
        ) -> Result<usize> {
            if self.fail {
                return Err(TallyError::Database("page_audit is read-only".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            rows.extend(pages.iter().map(|p| (run_id, entity, p.page)));
            Ok(pages.len())
        }
    }

    fn audited_page(page: u32, records: usize) -> PageAudit {
        PageAudit {
            page,
            marker: None,
            page_size: 100,
            records,
            status: PageStatus::Ok,
            http_status: None,
            response_hash: String::new(),
            key_min: None,
            key_max: None,
            duration_ms: 5,
            fetched_at: Utc::now(),
        }
    }

    enum Script {
        Records(usize, Option<InterruptionReason>),
        ExtractFails,
        PersistFails,
        Shutdown,
    }

    struct Scripted(Script);

    #[async_trait]
    impl EntityExtractor for Scripted {
        fn kind(&self) -> EntityKind {
            EntityKind::Freights
        }

        async fn extract(&self, _window: &ExtractionWindow) -> Result<ExtractionOutcome> {
            let count = match self.0 {
                Script::Records(n, _) => n,
                _ => 3,
            };
            let records: Vec<Value> = (0..count).map(|i| json!({ "id": i })).collect();
            match &self.0 {
                Script::Records(_, Some(reason)) => {
                    Ok(ExtractionOutcome::interrupted(EntityKind::Freights, records, 2, *reason))
                }
                Script::ExtractFails => Err(TallyError::Extraction("boom".to_string())),
                Script::Shutdown => Err(TallyError::Interrupted("stop".to_string())),
                _ => Ok(ExtractionOutcome::complete(EntityKind::Freights, records, 2)
                    .with_page_trail(vec![audited_page(1, count), audited_page(2, 0)])),
            }
        }

        async fn persist(&self, records: Vec<Value>) -> Result<SaveMetrics> {
            match self.0 {
                Script::PersistFails => Err(TallyError::Database("disk full".to_string())),
                _ => Ok(SaveMetrics::new(records.len(), records.len(), 0)),
            }
        }
    }

    fn window() -> ExtractionWindow {
        ExtractionWindow::for_day(EntityKind::Freights, NaiveDate::from_ymd_opt(2025, 4, 2).unwrap())
    }

    fn runner(log: Arc<MemoryLog>) -> ExtractionRunner {
        ExtractionRunner::new(log, InvalidTolerance::STRICT)
    }

    #[tokio::test]
    async fn test_complete_run_appends_one_row() {
        let log = Arc::new(MemoryLog::default());
        let report = runner(log.clone())
            .run(&Scripted(Script::Records(4, None)), &window())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.log_id, Some(1));
        let rows = log.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, RunStatus::Complete);
        assert_eq!(rows[0].records_extracted, 4);
        assert!(rows[0].window_start <= rows[0].window_end);
        assert_eq!(rows[0].data_start, window().start());
    }

    #[tokio::test]
    async fn test_record_limit_is_logged_incomplete() {
        let log = Arc::new(MemoryLog::default());
        let report = runner(log.clone())
            .run(
                &Scripted(Script::Records(4, Some(InterruptionReason::RecordLimit))),
                &window(),
            )
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::IncompleteLimit);
        assert_eq!(log.rows.lock().unwrap()[0].reason_code, "RECORD_LIMIT");
    }

    #[tokio::test]
    async fn test_extraction_error_becomes_api_error_row() {
        let log = Arc::new(MemoryLog::default());
        let report = runner(log.clone())
            .run(&Scripted(Script::ExtractFails), &window())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::ApiError);
        assert_eq!(report.reason, ReasonCode::ExtractionFailure);
        let rows = log.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].message.starts_with("Erro: Extraction error: boom | "));
    }

    #[tokio::test]
    async fn test_persistence_error_is_logged_then_propagated() {
        let log = Arc::new(MemoryLog::default());
        let err = runner(log.clone())
            .run(&Scripted(Script::PersistFails), &window())
            .await
            .unwrap_err();

        assert!(matches!(err, TallyError::Database(_)));
        let rows = log.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, RunStatus::IncompletePersistence);
        assert_eq!(rows[0].reason_code, "PERSISTENCE_FAILURE");
    }

    #[tokio::test]
    async fn test_shutdown_propagates() {
        let log = Arc::new(MemoryLog::default());
        let err = runner(log.clone())
            .run(&Scripted(Script::Shutdown), &window())
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Interrupted(_)));
        assert_eq!(log.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_page_trail_is_stamped_with_the_run_id() {
        let log = Arc::new(MemoryLog::default());
        let pages = Arc::new(MemoryPages::default());
        let report = runner(log)
            .with_page_audit(pages.clone())
            .run(&Scripted(Script::Records(4, None)), &window())
            .await
            .unwrap();

        let rows = pages.rows.lock().unwrap();
        assert_eq!(
            *rows,
            vec![
                (report.run_id, EntityKind::Freights, 1),
                (report.run_id, EntityKind::Freights, 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_page_trail_failure_does_not_change_the_run() {
        let log = Arc::new(MemoryLog::default());
        let pages = Arc::new(MemoryPages {
            fail: true,
            ..MemoryPages::default()
        });
        let report = runner(log.clone())
            .with_page_audit(pages)
            .run(&Scripted(Script::Records(4, None)), &window())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(log.rows.lock().unwrap().len(), 1);
    }
}
