//! Extraction log rows and their diagnostic message

use super::status::{ReasonCode, RunStatus};
use super::taxonomy::Reconciliation;
use crate::domain::{EntityKind, RunId};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Counters gathered while running one extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Raw records returned by the source
    pub received: usize,
    pub unique: usize,
    pub persisted: usize,
    pub invalid: usize,
    pub pages: u32,
    pub duration_ms: u64,
}

impl RunCounters {
    /// Unique records the store did not write
    pub fn ignored(&self) -> usize {
        self.unique.saturating_sub(self.persisted)
    }

    /// Count recorded as `records_extracted`: the deduplicated figure when
    /// deduplication actually changed something.
    pub fn logged_count(&self) -> usize {
        if self.unique > 0 && self.unique != self.received {
            self.unique
        } else {
            self.received
        }
    }
}

/// One append-only row of the extraction log.
///
/// `window_start`/`window_end` are the wall-clock bounds of the run itself.
/// The audit counts persisted rows stamped between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionLogEntry {
    /// Store-assigned identifier, `None` until appended
    pub id: Option<i64>,
    pub run_id: RunId,
    pub entity: EntityKind,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Requested data range
    pub data_start: NaiveDate,
    pub data_end: NaiveDate,
    pub status: RunStatus,
    pub reason_code: String,
    pub records_extracted: i64,
    pub pages_processed: i64,
    pub message: String,
}

impl ExtractionLogEntry {
    /// Builds the row for a run that produced counters
    #[allow(clippy::too_many_arguments)]
    pub fn from_run(
        run_id: RunId,
        entity: EntityKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        data_start: NaiveDate,
        data_end: NaiveDate,
        reconciliation: Reconciliation,
        counters: &RunCounters,
    ) -> Self {
        let message = build_message(counters, data_start, data_end, &reconciliation);
        Self {
            id: None,
            run_id,
            entity,
            window_start,
            window_end,
            data_start,
            data_end,
            status: reconciliation.status,
            reason_code: reconciliation.reason.as_str().to_string(),
            records_extracted: counters.logged_count() as i64,
            pages_processed: i64::from(counters.pages),
            message,
        }
    }

    /// Builds the row for a run whose extraction or persistence raised
    #[allow(clippy::too_many_arguments)]
    pub fn from_failure(
        run_id: RunId,
        entity: EntityKind,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        data_start: NaiveDate,
        data_end: NaiveDate,
        reconciliation: Reconciliation,
        counters: &RunCounters,
        error: &str,
    ) -> Self {
        let mut entry = Self::from_run(
            run_id,
            entity,
            window_start,
            window_end,
            data_start,
            data_end,
            reconciliation,
            counters,
        );
        entry.message = format!("Erro: {} | {}", error, entry.message);
        entry
    }

    /// Structured diagnostic line emitted once per run
    pub fn diag_line(&self, counters: &RunCounters) -> String {
        format!(
            "ETL_DIAG status_code={} | reason_code={} | api_count={} | unique_count={} | db_upserts={} | invalid_count={} | pages={}",
            self.status.storage_code(),
            self.reason_code,
            counters.received,
            counters.unique,
            counters.persisted,
            counters.invalid,
            counters.pages
        )
    }
}

/// Renders `n` with thousands separators
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Human summary followed by machine-readable `key=value` counters
pub fn build_message(
    counters: &RunCounters,
    data_start: NaiveDate,
    data_end: NaiveDate,
    reconciliation: &Reconciliation,
) -> String {
    let mut msg = format!("API: {} recebidos", group_thousands(counters.received));
    if counters.received != counters.unique {
        msg.push_str(&format!(" (únicos: {})", group_thousands(counters.unique)));
    }
    msg.push_str(&format!(" | DB: {} processados", group_thousands(counters.persisted)));

    let ignored = counters.ignored();
    if ignored > 0 {
        msg.push_str(&format!(
            " | Delta: {} (duplicados/ignorados)",
            group_thousands(ignored)
        ));
    }
    if counters.invalid > 0 {
        msg.push_str(&format!(
            " | Inválidos descartados: {}",
            group_thousands(counters.invalid)
        ));
    }
    msg.push_str(&format!(" | Tempo: {}ms", counters.duration_ms));

    if data_start != data_end {
        msg.push_str(&format!(" | Período: {} a {}", data_start, data_end));
    } else {
        msg.push_str(&format!(" | Data: {}", data_start));
    }

    msg.push_str(&format!(
        " | status_code={} | reason_code={} | api_count={} | unique_count={} | db_upserts={} | invalid_count={}",
        reconciliation.status.storage_code(),
        reconciliation.reason.as_str(),
        counters.received,
        counters.unique,
        counters.persisted,
        counters.invalid
    ));
    msg
}

fn counter_regex(key: &str) -> Option<&'static Regex> {
    static UNIQUE: OnceLock<Option<Regex>> = OnceLock::new();
    static UPSERTS: OnceLock<Option<Regex>> = OnceLock::new();
    static API: OnceLock<Option<Regex>> = OnceLock::new();

    let cell = match key {
        "unique_count" => &UNIQUE,
        "db_upserts" => &UPSERTS,
        "api_count" => &API,
        _ => return None,
    };
    cell.get_or_init(|| Regex::new(&format!(r"{key}=(\d+)")).ok())
        .as_ref()
}

/// Reads a machine-readable counter (`unique_count`, `db_upserts`, `api_count`)
/// back out of a log message
pub fn message_counter(message: &str, key: &str) -> Option<i64> {
    counter_regex(key)?
        .captures(message)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Reason code for the failure row written when extraction raised
pub fn extraction_failure() -> Reconciliation {
    Reconciliation {
        status: RunStatus::ApiError,
        reason: ReasonCode::ExtractionFailure,
    }
}

/// Reason code for the failure row written when persistence raised
pub fn persistence_failure() -> Reconciliation {
    Reconciliation {
        status: RunStatus::IncompletePersistence,
        reason: ReasonCode::PersistenceFailure,
    }
}
