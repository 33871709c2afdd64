//! Run status taxonomy and reason codes

use crate::core::extraction::InterruptionReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Final classification of one extraction run.
///
/// The storage codes are what the extraction log persists and what the audit
/// reads back; they are stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Listing ended naturally, every unique record persisted, invalid ratio tolerated
    Complete,
    /// Listing stopped at a local ceiling or guard
    IncompleteLimit,
    /// Store wrote a different number of rows than were unique
    IncompletePersistence,
    /// Too many records were discarded as invalid
    IncompleteData,
    /// Remote API failure or open breaker
    ApiError,
}

impl RunStatus {
    pub const ALL: [RunStatus; 5] = [
        RunStatus::Complete,
        RunStatus::IncompleteLimit,
        RunStatus::IncompletePersistence,
        RunStatus::IncompleteData,
        RunStatus::ApiError,
    ];

    /// Code persisted in `extraction_log.status`
    pub fn storage_code(&self) -> &'static str {
        match self {
            RunStatus::Complete => "COMPLETO",
            RunStatus::IncompleteLimit => "INCOMPLETO_LIMITE",
            RunStatus::IncompletePersistence => "INCOMPLETO_DB",
            RunStatus::IncompleteData => "INCOMPLETO_DADOS",
            RunStatus::ApiError => "ERRO_API",
        }
    }

    /// Taxonomy name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            RunStatus::Complete => "COMPLETE",
            RunStatus::IncompleteLimit => "INCOMPLETE_LIMIT",
            RunStatus::IncompletePersistence => "INCOMPLETE_PERSISTENCE",
            RunStatus::IncompleteData => "INCOMPLETE_DATA",
            RunStatus::ApiError => "API_ERROR",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RunStatus::Complete => "Extraction complete and fully persisted",
            RunStatus::IncompleteLimit => "Extraction stopped at a page or record limit",
            RunStatus::IncompletePersistence => "Persisted row count diverges from unique records",
            RunStatus::IncompleteData => "Invalid records above tolerance were discarded",
            RunStatus::ApiError => "Remote API failure interrupted the extraction",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Complete)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_code())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    /// Accepts storage codes, taxonomy names and legacy aliases, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "COMPLETO" | "COMPLETE" => Ok(RunStatus::Complete),
            "INCOMPLETO_LIMITE" | "INCOMPLETE_LIMIT" | "INCOMPLETO" => Ok(RunStatus::IncompleteLimit),
            "INCOMPLETO_DB" | "INCOMPLETO_SALVAMENTO" | "INCOMPLETE_PERSISTENCE" => {
                Ok(RunStatus::IncompletePersistence)
            }
            "INCOMPLETO_DADOS" | "INCOMPLETO_DADOS_INVALIDOS" | "INCOMPLETE_DATA" => {
                Ok(RunStatus::IncompleteData)
            }
            "ERRO_API" | "API_ERROR" => Ok(RunStatus::ApiError),
            other => Err(format!("Unknown run status '{other}'")),
        }
    }
}

/// Sub-reason attached to a run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    Ok,
    /// Complete run that discarded invalid records within tolerance
    InvalidTolerated,
    /// Pagination stopped early
    Interrupted(InterruptionReason),
    PersistenceDivergence,
    InvalidSourceData,
    /// The store raised while persisting
    PersistenceFailure,
    /// Extraction raised instead of returning an outcome
    ExtractionFailure,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Ok => "OK",
            ReasonCode::InvalidTolerated => "INVALIDOS_TOLERADOS",
            ReasonCode::Interrupted(reason) => reason.as_str(),
            ReasonCode::PersistenceDivergence => "DIVERGENCIA_SALVAMENTO",
            ReasonCode::InvalidSourceData => "DADOS_INVALIDOS_ORIGEM",
            ReasonCode::PersistenceFailure => "PERSISTENCE_FAILURE",
            ReasonCode::ExtractionFailure => "EXTRACTION_FAILURE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
