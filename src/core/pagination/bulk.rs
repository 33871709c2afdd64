//! Single-shot range query driver

use super::{ensure_running, PageLimits};
use crate::adapters::sources::BulkSource;
use crate::core::extraction::{ExtractionOutcome, InterruptionReason};
use crate::domain::{EntitySpec, ExtractionWindow, Result};
use tokio::sync::watch;

/// One request for the whole window. A result that fills the record ceiling
/// may have been truncated by the backend, so it is reported as incomplete.
pub async fn drive_bulk(
    source: &dyn BulkSource,
    spec: &'static EntitySpec,
    window: &ExtractionWindow,
    limits: &PageLimits,
    shutdown: &watch::Receiver<bool>,
) -> Result<ExtractionOutcome> {
    let kind = spec.kind;

    if !limits.start_delay.is_zero() {
        tokio::time::sleep(limits.start_delay).await;
    }
    ensure_running(shutdown, kind)?;

    match source.fetch_range(spec, window, limits.max_records).await {
        Ok(records) if records.len() >= limits.max_records => {
            tracing::warn!(
                entity = %kind,
                records = records.len(),
                ceiling = limits.max_records,
                "Range query hit the record ceiling; results may be truncated"
            );
            Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                1,
                InterruptionReason::RecordLimit,
            ))
        }
        Ok(records) => Ok(ExtractionOutcome::complete(kind, records, 1)),
        Err(e) => {
            tracing::error!(entity = %kind, error = %e, "Range query failed");
            Ok(
                ExtractionOutcome::interrupted(kind, Vec::new(), 0, InterruptionReason::ApiError)
                    .with_error(e.to_string()),
            )
        }
    }
}
