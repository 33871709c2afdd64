//! Audit report structures
//!
//! Wraps an [`AuditResult`] with the execution it covered, for human review.

use super::completeness::{CompletenessCheck, CompletenessStatus};
use super::engine::AuditResult;
use super::finding::Severity;
use crate::domain::EntityKind;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Audit report for one execution window
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// When the audit ran
    pub audited_at: DateTime<Utc>,

    /// Execution window audited
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    pub entities: Vec<EntityKind>,

    pub loop_mode: bool,

    pub result: AuditResult,

    /// Day-level completeness, when requested
    pub completeness: Vec<CompletenessCheck>,

    /// Duration of the audit in milliseconds
    pub duration_ms: u64,
}

impl AuditReport {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        entities: Vec<EntityKind>,
        loop_mode: bool,
        result: AuditResult,
    ) -> Self {
        Self {
            audited_at: Utc::now(),
            start,
            end,
            entities,
            loop_mode,
            result,
            completeness: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn with_completeness(mut self, checks: Vec<CompletenessCheck>) -> Self {
        self.completeness = checks;
        self
    }

    pub fn set_duration(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
    }

    /// Valid audit and every completeness check OK
    pub fn is_success(&self) -> bool {
        self.result.valid
            && self
                .completeness
                .iter()
                .all(|c| c.status == CompletenessStatus::Ok)
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📊 Integrity Audit Report\n");
        summary.push_str(&format!("  Audited at: {}\n", self.audited_at));
        summary.push_str(&format!("  Window: {} .. {}\n", self.start, self.end));
        summary.push_str(&format!(
            "  Entities: {}\n",
            self.entities
                .iter()
                .map(EntityKind::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        ));
        summary.push_str(&format!("  Loop mode: {}\n", self.loop_mode));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  ✅ OK: {}\n", self.result.count(Severity::Ok)));
        summary.push_str(&format!("  ⚠️  Alerts: {}\n", self.result.count(Severity::Alert)));
        summary.push_str(&format!("  ❌ Failures: {}\n", self.result.failures.len()));
        summary.push_str(&format!(
            "  Result: {}\n",
            if self.result.valid { "VALID" } else { "INVALID" }
        ));

        let alerts: Vec<_> = self
            .result
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Alert)
            .collect();
        if !alerts.is_empty() {
            summary.push_str("\n⚠️  Alerts:\n");
            for (i, alert) in alerts.iter().enumerate() {
                summary.push_str(&format!("  {}. [{}] {}\n", i + 1, alert.entity, alert.code));
                summary.push_str(&format!("     {}\n", alert.detail));
            }
        }

        if !self.result.failures.is_empty() {
            summary.push_str("\n❌ Failures:\n");
            for (i, failure) in self.result.failures.iter().enumerate() {
                summary.push_str(&format!("  {}. {}\n", i + 1, failure));
            }
        }

        if !self.completeness.is_empty() {
            summary.push_str("\n📋 Completeness:\n");
            for check in &self.completeness {
                let counts = match (check.expected, check.persisted) {
                    (Some(expected), Some(persisted)) => {
                        format!("expected={expected}, persisted={persisted}")
                    }
                    _ => "no reference".to_string(),
                };
                summary.push_str(&format!("  {:<18} {:<11} {}\n", check.entity.as_str(), check.status, counts));
            }
        }

        summary
    }
}
