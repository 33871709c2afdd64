//! Pointer (`start=<lastSeenId>`) pagination driver

use super::trail::PageTrail;
use super::{ensure_running, PageLimits};
use crate::adapters::sources::PointerSource;
use crate::core::extraction::{ExtractionOutcome, InterruptionReason};
use crate::domain::{EntitySpec, ExtractionWindow, Result};
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::watch;

/// Walks the listing by marker. An empty page or a missing marker ends the
/// listing normally; a marker seen before means the backend is looping.
pub async fn drive_pointer(
    source: &dyn PointerSource,
    spec: &'static EntitySpec,
    window: &ExtractionWindow,
    limits: &PageLimits,
    shutdown: &watch::Receiver<bool>,
) -> Result<ExtractionOutcome> {
    let mut trail = PageTrail::new();
    let outcome = walk(source, spec, window, limits, shutdown, &mut trail).await?;
    Ok(outcome.with_page_trail(trail.into_pages()))
}

async fn walk(
    source: &dyn PointerSource,
    spec: &'static EntitySpec,
    window: &ExtractionWindow,
    limits: &PageLimits,
    shutdown: &watch::Receiver<bool>,
    trail: &mut PageTrail,
) -> Result<ExtractionOutcome> {
    let kind = spec.kind;

    if !limits.start_delay.is_zero() {
        tokio::time::sleep(limits.start_delay).await;
    }

    let mut records = Vec::new();
    let mut pages: u32 = 0;
    let mut marker: Option<String> = None;
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        if pages >= limits.max_pages {
            tracing::warn!(entity = %kind, pages, "Page limit reached");
            return Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                pages,
                InterruptionReason::PageLimit,
            ));
        }
        if records.len() >= limits.max_records {
            tracing::warn!(entity = %kind, records = records.len(), "Record limit reached");
            return Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                pages,
                InterruptionReason::RecordLimit,
            ));
        }
        ensure_running(shutdown, kind)?;

        let requested = Instant::now();
        let page = match source
            .fetch_page(spec, window, marker.as_deref(), limits.page_size)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                trail.failed(pages + 1, marker.as_deref(), limits.page_size, &e, requested);
                tracing::error!(entity = %kind, page = pages + 1, error = %e, "Pointer page request failed");
                return Ok(ExtractionOutcome::interrupted(
                    kind,
                    records,
                    pages,
                    InterruptionReason::ApiError,
                )
                .with_error(e.to_string()));
            }
        };

        pages += 1;
        trail.fetched(spec, pages, marker.as_deref(), limits.page_size, &page.records, requested);
        if page.records.is_empty() {
            return Ok(ExtractionOutcome::complete(kind, records, pages));
        }
        records.extend(page.records);

        if limits.should_log_progress(pages) {
            tracing::info!(entity = %kind, pages, records = records.len(), "Extraction progress");
        }

        let Some(next) = page.next_marker else {
            return Ok(ExtractionOutcome::complete(kind, records, pages));
        };

        if !seen.insert(next.clone()) {
            tracing::error!(entity = %kind, marker = %next, pages, "Marker repeated, stopping");
            return Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                pages,
                InterruptionReason::LoopDetected,
            ));
        }
        marker = Some(next);
    }
}
