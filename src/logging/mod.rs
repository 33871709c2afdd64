//! Logging and observability
//!
//! Structured logging through `tracing`, with a JSON rolling file layer, plus a
//! handful of macros that keep the field names of recurring events consistent.
//!
//! ```no_run
//! use tally::logging::init_logging;
//! use tally::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(entity = "invoices", "Extraction started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of an entity extraction
///
/// ```no_run
/// use tally::log_extraction_start;
/// use tally::domain::EntityKind;
///
/// log_extraction_start!(EntityKind::Invoices, "2025-01-01", "2025-01-02");
/// ```
#[macro_export]
macro_rules! log_extraction_start {
    ($entity:expr, $start:expr, $end:expr) => {
        tracing::info!(
            entity = %$entity,
            window_start = %$start,
            window_end = %$end,
            "Starting extraction"
        );
    };
}

/// Log the reconciled result of an entity extraction
#[macro_export]
macro_rules! log_extraction_complete {
    ($entity:expr, $status:expr, $fetched:expr, $persisted:expr, $duration:expr) => {
        tracing::info!(
            entity = %$entity,
            status = %$status,
            fetched = $fetched,
            persisted = $persisted,
            duration_ms = $duration.as_millis() as u64,
            "Extraction finished"
        );
    };
}

/// Log a retry attempt
///
/// ```no_run
/// use tally::log_retry_attempt;
///
/// log_retry_attempt!("invoices page 3", 2, 5, 4000u64, "Server error: 503");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($label:expr, $attempt:expr, $max_retries:expr, $delay_ms:expr, $reason:expr) => {
        tracing::warn!(
            label = %$label,
            attempt = $attempt,
            max_retries = $max_retries,
            delay_ms = $delay_ms,
            error = %$reason,
            "Retrying request after error"
        );
    };
}

/// Log one audit finding in the fixed `INTEGRIDADE_ETL` line format that log
/// scrapers key on
#[macro_export]
macro_rules! log_audit_finding {
    ($finding:expr) => {
        match $finding.severity {
            $crate::core::audit::Severity::Ok => tracing::info!(
                entity = %$finding.entity,
                code = %$finding.code,
                "{}",
                $finding.log_line()
            ),
            $crate::core::audit::Severity::Alert => tracing::warn!(
                entity = %$finding.entity,
                code = %$finding.code,
                "{}",
                $finding.log_line()
            ),
            $crate::core::audit::Severity::Error => tracing::error!(
                entity = %$finding.entity,
                code = %$finding.code,
                "{}",
                $finding.log_line()
            ),
        }
    };
}
