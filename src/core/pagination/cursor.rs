//! Cursor-forward pagination driver

use super::trail::PageTrail;
use super::{ensure_running, SourceBreakers, PageLimits};
use crate::adapters::sources::CursorSource;
use crate::core::extraction::{ExtractionOutcome, InterruptionReason};
use crate::domain::{EntitySpec, ExtractionWindow, Result};
use std::time::Instant;
use tokio::sync::watch;

/// Follows the continuation token until the source signals the end or a
/// ceiling is reached.
///
/// A repeated cursor while `hasNextPage` is still true is treated as a natural
/// end when the page was short, and as a loop otherwise. An empty page that
/// claims more pages is an interruption. Every request, failed ones included,
/// is noted in the outcome's page trail.
pub async fn drive_cursor(
    source: &dyn CursorSource,
    spec: &'static EntitySpec,
    window: &ExtractionWindow,
    limits: &PageLimits,
    breakers: &SourceBreakers,
    shutdown: &watch::Receiver<bool>,
) -> Result<ExtractionOutcome> {
    let mut trail = PageTrail::new();
    let outcome = walk(source, spec, window, limits, breakers, shutdown, &mut trail).await?;
    Ok(outcome.with_page_trail(trail.into_pages()))
}

async fn walk(
    source: &dyn CursorSource,
    spec: &'static EntitySpec,
    window: &ExtractionWindow,
    limits: &PageLimits,
    breakers: &SourceBreakers,
    shutdown: &watch::Receiver<bool>,
    trail: &mut PageTrail,
) -> Result<ExtractionOutcome> {
    let kind = spec.kind;

    if breakers.is_open(kind) {
        tracing::warn!(
            entity = %kind,
            failures = breakers.failures(kind),
            "Source breaker open, skipping extraction"
        );
        return Ok(ExtractionOutcome::interrupted(
            kind,
            Vec::new(),
            0,
            InterruptionReason::CircuitBreaker,
        ));
    }

    if !limits.start_delay.is_zero() {
        tokio::time::sleep(limits.start_delay).await;
    }

    let mut records = Vec::new();
    let mut pages: u32 = 0;
    let mut cursor: Option<String> = None;

    loop {
        if pages >= limits.max_pages {
            tracing::warn!(entity = %kind, pages, records = records.len(), "Page limit reached");
            return Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                pages,
                InterruptionReason::PageLimit,
            ));
        }
        if records.len() >= limits.max_records {
            tracing::warn!(entity = %kind, pages, records = records.len(), "Record limit reached");
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
            .fetch_page(spec, window, cursor.as_deref(), limits.page_size)
            .await
        {
            Ok(page) => {
                breakers.record_success(kind);
                page
            }
            Err(e) => {
                trail.failed(pages + 1, cursor.as_deref(), limits.page_size, &e, requested);
                let failures = breakers.record_failure(kind);
                tracing::error!(
                    entity = %kind,
                    page = pages + 1,
                    failures,
                    error = %e,
                    "Cursor page request failed"
                );
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
        trail.fetched(spec, pages, cursor.as_deref(), limits.page_size, &page.records, requested);
        let page_len = page.records.len();
        records.extend(page.records);

        if limits.should_log_progress(pages) {
            tracing::info!(entity = %kind, pages, records = records.len(), "Extraction progress");
        }

        if !page.has_next_page {
            return Ok(ExtractionOutcome::complete(kind, records, pages));
        }

        let Some(next) = page.end_cursor else {
            tracing::error!(entity = %kind, pages, "Source claims more pages but sent no cursor");
            return Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                pages,
                InterruptionReason::LoopDetected,
            ));
        };

        if cursor.as_deref() == Some(next.as_str()) {
            if page_len < limits.page_size {
                tracing::debug!(entity = %kind, pages, "Repeated cursor on a short page, treating as end");
                return Ok(ExtractionOutcome::complete(kind, records, pages));
            }
            tracing::error!(entity = %kind, pages, cursor = %next, "Repeated cursor on a full page");
            return Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                pages,
                InterruptionReason::LoopDetected,
            ));
        }

        if page_len == 0 {
            tracing::warn!(entity = %kind, pages, "Empty page while more pages were announced");
            return Ok(ExtractionOutcome::interrupted(
                kind,
                records,
                pages,
                InterruptionReason::EmptyPage,
            ));
        }

        cursor = Some(next);
    }
}
