//! Extraction cycle summary

use super::reconcile::ReconciliationSummary;
use crate::core::audit::AuditResult;
use crate::core::reconciliation::RunReport;
use crate::domain::EntityKind;
use serde::Serialize;
use std::time::Duration;

/// An entity whose run raised instead of producing a report
#[derive(Debug, Clone, Serialize)]
pub struct CycleError {
    pub entity: EntityKind,
    pub message: String,
}

/// Summary of one pass over the configured entities
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub reports: Vec<RunReport>,

    /// Runs that raised (persistence or log failures)
    pub errors: Vec<CycleError>,

    /// Audit of this cycle, unless skipped or interrupted
    pub audit: Option<AuditResult>,

    /// Loop-mode re-extraction of missed days, when it ran
    pub reconciliation: Option<ReconciliationSummary>,

    /// Whether shutdown cut the cycle short
    pub interrupted: bool,

    pub duration: Duration,
}

impl CycleSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete_runs(&self) -> usize {
        self.reports.iter().filter(|r| r.is_complete()).count()
    }

    pub fn incomplete_runs(&self) -> usize {
        self.reports.len() - self.complete_runs()
    }

    /// Every run complete, nothing raised and the audit (if any) valid
    pub fn is_successful(&self) -> bool {
        !self.interrupted
            && self.errors.is_empty()
            && self.incomplete_runs() == 0
            && self.audit.as_ref().map_or(true, |a| a.valid)
    }

    /// Process exit code for this cycle
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            130
        } else if self.is_successful() {
            0
        } else {
            1
        }
    }
}
