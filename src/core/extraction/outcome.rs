//! Extraction outcome and persistence metrics

use crate::core::pagination::PageAudit;
use crate::domain::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Why a pagination loop stopped before the source signalled its end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptionReason {
    /// Configured page ceiling reached
    PageLimit,
    /// Configured record ceiling reached
    RecordLimit,
    /// The source repeated a continuation marker
    LoopDetected,
    /// A page request failed after the channel gave up
    ApiError,
    /// The entity's breaker was open, nothing was requested
    CircuitBreaker,
    /// Empty page while the source still claimed more pages
    EmptyPage,
}

impl InterruptionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptionReason::PageLimit => "PAGE_LIMIT",
            InterruptionReason::RecordLimit => "RECORD_LIMIT",
            InterruptionReason::LoopDetected => "LOOP_DETECTED",
            InterruptionReason::ApiError => "API_ERROR",
            InterruptionReason::CircuitBreaker => "CIRCUIT_BREAKER",
            InterruptionReason::EmptyPage => "EMPTY_PAGE",
        }
    }

    /// Interruptions caused by the remote side rather than by a local ceiling
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            InterruptionReason::ApiError | InterruptionReason::CircuitBreaker
        )
    }
}

impl fmt::Display for InterruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterruptionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PAGE_LIMIT" | "LIMITE_PAGINAS" => Ok(InterruptionReason::PageLimit),
            "RECORD_LIMIT" | "LIMITE_REGISTROS" => Ok(InterruptionReason::RecordLimit),
            "LOOP_DETECTED" | "LOOP_DETECTADO" => Ok(InterruptionReason::LoopDetected),
            "API_ERROR" | "ERRO_API" => Ok(InterruptionReason::ApiError),
            "CIRCUIT_BREAKER" => Ok(InterruptionReason::CircuitBreaker),
            "EMPTY_PAGE" | "PAGINA_VAZIA" => Ok(InterruptionReason::EmptyPage),
            other => Err(format!("Unknown interruption reason '{other}'")),
        }
    }
}

/// Result of one `extract` call
///
/// `is_complete()` is true exactly when no interruption was recorded.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    kind: EntityKind,
    records: Vec<Value>,
    pages_processed: u32,
    interruption: Option<InterruptionReason>,
    error: Option<String>,
    page_trail: Vec<PageAudit>,
}

impl ExtractionOutcome {
    /// Listing ended naturally
    pub fn complete(kind: EntityKind, records: Vec<Value>, pages_processed: u32) -> Self {
        Self {
            kind,
            records,
            pages_processed,
            interruption: None,
            error: None,
            page_trail: Vec::new(),
        }
    }

    /// Listing stopped early; the records gathered so far are kept
    pub fn interrupted(
        kind: EntityKind,
        records: Vec<Value>,
        pages_processed: u32,
        reason: InterruptionReason,
    ) -> Self {
        Self {
            kind,
            records,
            pages_processed,
            interruption: Some(reason),
            error: None,
            page_trail: Vec::new(),
        }
    }

    /// Attaches the remote error that caused an `ApiError` interruption
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches the pages the driver requested
    pub(crate) fn with_page_trail(mut self, pages: Vec<PageAudit>) -> Self {
        self.page_trail = pages;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn pages_processed(&self) -> u32 {
        self.pages_processed
    }

    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }

    pub fn interruption(&self) -> Option<InterruptionReason> {
        self.interruption
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn page_trail(&self) -> &[PageAudit] {
        &self.page_trail
    }

    /// Moves the page trail out, leaving it empty
    pub fn take_page_trail(&mut self) -> Vec<PageAudit> {
        std::mem::take(&mut self.page_trail)
    }

    /// Hands the records over for persistence
    pub fn into_records(self) -> Vec<Value> {
        self.records
    }

    /// Replaces the records, keeping the pagination facts (used after enrichment)
    pub(crate) fn replace_records(mut self, records: Vec<Value>) -> Self {
        self.records = records;
        self
    }
}

/// Counters computed while persisting one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveMetrics {
    /// Rows the store reported as written
    pub records_persisted: usize,
    /// Distinct natural keys among valid records
    pub unique_records: usize,
    /// Records dropped for lacking a natural key
    pub invalid_records: usize,
}

impl SaveMetrics {
    pub fn new(records_persisted: usize, unique_records: usize, invalid_records: usize) -> Self {
        Self {
            records_persisted,
            unique_records,
            invalid_records,
        }
    }

    /// Whether every unique record made it into the store
    pub fn is_consistent(&self) -> bool {
        self.records_persisted == self.unique_records
    }
}
