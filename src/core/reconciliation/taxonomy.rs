//! Derives the final status of a run

use super::status::{ReasonCode, RunStatus};
use crate::config::ToleranceConfig;
use crate::core::extraction::{ExtractionOutcome, InterruptionReason, SaveMetrics};

/// Invalid-record allowance for a single run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidTolerance {
    pub max_records: usize,
    pub max_percent: f64,
}

impl InvalidTolerance {
    /// No invalid record is tolerated
    pub const STRICT: InvalidTolerance = InvalidTolerance {
        max_records: 0,
        max_percent: 0.0,
    };

    /// Both the absolute and the percentage limit must hold
    pub fn allows(&self, invalid: usize, received: usize) -> bool {
        if invalid == 0 {
            return true;
        }
        let percent = invalid as f64 * 100.0 / received.max(1) as f64;
        invalid <= self.max_records && percent <= self.max_percent
    }
}

impl From<&ToleranceConfig> for InvalidTolerance {
    fn from(config: &ToleranceConfig) -> Self {
        Self {
            max_records: config.max_invalid_records,
            max_percent: config.max_invalid_percent,
        }
    }
}

/// Status plus the sub-reason explaining it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub status: RunStatus,
    pub reason: ReasonCode,
}

/// Signals the taxonomy is derived from
#[derive(Debug, Clone, Copy)]
pub struct RunSignals {
    pub interruption: Option<InterruptionReason>,
    pub received: usize,
    pub metrics: SaveMetrics,
}

impl RunSignals {
    pub fn new(outcome: &ExtractionOutcome, metrics: SaveMetrics) -> Self {
        Self {
            interruption: outcome.interruption(),
            received: outcome.record_count(),
            metrics,
        }
    }
}

/// Classifies a run. Checks are ordered: pagination completeness first, then
/// the persisted count, then the invalid-record ratio.
pub fn reconcile(signals: &RunSignals, tolerance: &InvalidTolerance) -> Reconciliation {
    if let Some(reason) = signals.interruption {
        let status = if reason.is_remote_error() {
            RunStatus::ApiError
        } else {
            RunStatus::IncompleteLimit
        };
        return Reconciliation {
            status,
            reason: ReasonCode::Interrupted(reason),
        };
    }

    if !signals.metrics.is_consistent() {
        return Reconciliation {
            status: RunStatus::IncompletePersistence,
            reason: ReasonCode::PersistenceDivergence,
        };
    }

    let invalid = signals.metrics.invalid_records;
    if !tolerance.allows(invalid, signals.received) {
        return Reconciliation {
            status: RunStatus::IncompleteData,
            reason: ReasonCode::InvalidSourceData,
        };
    }

    Reconciliation {
        status: RunStatus::Complete,
        reason: if invalid > 0 {
            ReasonCode::InvalidTolerated
        } else {
            ReasonCode::Ok
        },
    }
}
