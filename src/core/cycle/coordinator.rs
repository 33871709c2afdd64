//! Extraction cycle coordinator
//!
//! Runs every configured entity through the runner in registry order, then
//! audits the execution it just produced. In loop mode a reconciler may then
//! re-extract days that earlier cycles missed.

use super::reconcile::LoopReconciler;
use super::summary::{CycleError, CycleSummary};
use crate::core::audit::AuditEngine;
use crate::core::extraction::ExtractorRegistry;
use crate::core::reconciliation::ExtractionRunner;
use crate::domain::{EntityKind, ExtractionWindow, Result, TallyError};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Requested data range for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleRange {
    /// Yesterday through today, recomputed every cycle
    TrailingDay,
    Fixed { start: NaiveDate, end: NaiveDate },
}

impl CycleRange {
    pub fn window(&self, kind: EntityKind, today: NaiveDate) -> Result<ExtractionWindow> {
        match self {
            CycleRange::TrailingDay => Ok(ExtractionWindow::trailing_day(kind, today)),
            CycleRange::Fixed { start, end } => {
                ExtractionWindow::new(kind, *start, *end).map_err(TallyError::Validation)
            }
        }
    }
}

pub struct ExtractionCycle {
    registry: Arc<ExtractorRegistry>,
    runner: Arc<ExtractionRunner>,
    audit: Option<Arc<AuditEngine>>,
    reconciler: Option<Arc<LoopReconciler>>,
    entities: Vec<EntityKind>,
    loop_mode: bool,
    shutdown: watch::Receiver<bool>,
}

impl ExtractionCycle {
    pub fn new(
        registry: Arc<ExtractorRegistry>,
        runner: Arc<ExtractionRunner>,
        entities: Vec<EntityKind>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            runner,
            audit: None,
            reconciler: None,
            entities,
            loop_mode: false,
            shutdown,
        }
    }

    /// Audit each cycle once its runs are logged
    pub fn with_audit(mut self, engine: Arc<AuditEngine>) -> Self {
        self.audit = Some(engine);
        self
    }

    /// Re-extract missed days after each cycle; only consulted in loop mode
    pub fn with_reconciler(mut self, reconciler: Arc<LoopReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Audit as a continuous loop (orphans over tolerance become alerts)
    pub fn loop_mode(mut self, loop_mode: bool) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn entities(&self) -> &[EntityKind] {
        &self.entities
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Runs one cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when a window cannot be built or an entity has no
    /// extractor. Failed runs are collected in the summary.
    pub async fn run_once(&self, range: CycleRange) -> Result<CycleSummary> {
        let timer = Instant::now();
        let started_at = Utc::now();
        let mut summary = CycleSummary::new();

        self.run_entities(range, started_at.date_naive(), &mut summary)
            .await?;

        if let Some(engine) = &self.audit {
            if summary.interrupted {
                tracing::info!("Skipping audit of interrupted cycle");
            } else {
                let result = engine
                    .validate_execution(started_at, Utc::now(), &self.entities, self.loop_mode)
                    .await;
                summary.audit = Some(result);
            }
        }

        match &self.reconciler {
            Some(reconciler) if self.loop_mode && !summary.interrupted => {
                let cycle_ok = summary.is_successful();
                let this = self;
                let outcome = reconciler
                    .after_cycle(started_at, Utc::now(), cycle_ok, move |day| {
                        this.reconcile_day(day)
                    })
                    .await;
                summary.interrupted = outcome.interrupted;
                summary.reconciliation = Some(outcome);
            }
            _ => {}
        }

        summary.duration = timer.elapsed();
        tracing::info!(
            complete = summary.complete_runs(),
            incomplete = summary.incomplete_runs(),
            errors = summary.errors.len(),
            interrupted = summary.interrupted,
            duration_ms = summary.duration.as_millis() as u64,
            "Extraction cycle finished"
        );
        Ok(summary)
    }

    async fn run_entities(
        &self,
        range: CycleRange,
        today: NaiveDate,
        summary: &mut CycleSummary,
    ) -> Result<()> {
        for &kind in &self.entities {
            if self.shutdown_requested() {
                summary.interrupted = true;
                break;
            }

            let extractor = self.registry.get(kind)?;
            let window = range.window(kind, today)?;

            match self.runner.run(extractor.as_ref(), &window).await {
                Ok(report) => summary.reports.push(report),
                Err(TallyError::Interrupted(reason)) => {
                    tracing::warn!(entity = %kind, reason = %reason, "Cycle interrupted");
                    summary.interrupted = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(entity = %kind, error = %e, "Run failed");
                    summary.errors.push(CycleError {
                        entity: kind,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Re-extracts every entity for `day`; any incomplete run fails the day
    async fn reconcile_day(&self, day: NaiveDate) -> Result<()> {
        let mut pass = CycleSummary::new();
        self.run_entities(CycleRange::Fixed { start: day, end: day }, day, &mut pass)
            .await?;

        if pass.interrupted {
            return Err(TallyError::Interrupted(format!(
                "Reconciliation of {day} interrupted by shutdown"
            )));
        }
        if !pass.errors.is_empty() || pass.incomplete_runs() > 0 {
            let mut failed: Vec<String> = pass
                .reports
                .iter()
                .filter(|r| !r.is_complete())
                .map(|r| format!("{} {}", r.entity, r.status))
                .collect();
            failed.extend(pass.errors.iter().map(|e| format!("{} {}", e.entity, e.message)));
            return Err(TallyError::Extraction(format!(
                "{} run(s) not complete: {}",
                failed.len(),
                failed.join(", ")
            )));
        }
        Ok(())
    }
}
