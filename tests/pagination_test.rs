//! Integration tests for the pagination drivers
//!
//! These tests verify that:
//! - Listings that end naturally are complete
//! - Page and record ceilings interrupt with the matching reason
//! - Repeated continuation markers are detected
//! - Failing sources trip the per-entity breaker
//! - Shutdown aborts instead of producing a partial outcome
//! - Every page request, failed or not, lands in the page trail

mod common;

use async_trait::async_trait;
use common::{cursor_page, day, pointer_page, records, ScriptedCursor, ScriptedPointer};
use serde_json::Value;
use std::time::Duration;
use tally::adapters::sources::BulkSource;
use tally::core::extraction::InterruptionReason;
use tally::core::pagination::{
    drive_bulk, drive_cursor, drive_pointer, PageLimits, PageStatus, SourceBreakers,
};
use tally::domain::{ApiError, EntityKind, EntitySpec, ExtractionWindow, TallyError};
use tokio::sync::watch;

fn limits(max_pages: u32, max_records: usize, page_size: usize) -> PageLimits {
    PageLimits {
        max_pages,
        max_records,
        page_size,
        progress_interval_pages: 10,
        start_delay: Duration::ZERO,
    }
}

fn freights_window() -> ExtractionWindow {
    ExtractionWindow::for_day(EntityKind::Freights, day(2025, 3, 10))
}

fn occurrences_window() -> ExtractionWindow {
    ExtractionWindow::for_day(EntityKind::Occurrences, day(2025, 3, 10))
}

#[tokio::test]
async fn test_cursor_natural_end() {
    let source = ScriptedCursor::new(vec![
        Ok(cursor_page(records(1, 100), Some("c1"), true)),
        Ok(cursor_page(records(101, 40), Some("c2"), false)),
    ]);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(10, 10_000, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.record_count(), 140);
    assert_eq!(outcome.pages_processed(), 2);
    assert_eq!(
        *source.requested.lock().unwrap(),
        vec![None, Some("c1".to_string())]
    );
}

#[tokio::test]
async fn test_cursor_page_ceiling() {
    let pages = (1..=5)
        .map(|i| Ok(cursor_page(records(i * 100, 100), Some(&format!("c{i}")), true)))
        .collect();
    let source = ScriptedCursor::new(pages);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(2, 10_000, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.interruption(), Some(InterruptionReason::PageLimit));
    assert_eq!(outcome.pages_processed(), 2);
    assert_eq!(outcome.record_count(), 200);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_cursor_record_ceiling() {
    let pages = (1..=5)
        .map(|i| Ok(cursor_page(records(i * 100, 100), Some(&format!("c{i}")), true)))
        .collect();
    let source = ScriptedCursor::new(pages);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(50, 150, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.interruption(), Some(InterruptionReason::RecordLimit));
    assert_eq!(outcome.record_count(), 200);
}

#[tokio::test]
async fn test_cursor_repeated_on_full_page_is_a_loop() {
    let source = ScriptedCursor::new(vec![
        Ok(cursor_page(records(1, 100), Some("same"), true)),
        Ok(cursor_page(records(101, 100), Some("same"), true)),
    ]);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(50, 10_000, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.interruption(), Some(InterruptionReason::LoopDetected));
    assert_eq!(outcome.pages_processed(), 2);
}

#[tokio::test]
async fn test_cursor_repeated_on_short_page_is_the_end() {
    let source = ScriptedCursor::new(vec![
        Ok(cursor_page(records(1, 100), Some("same"), true)),
        Ok(cursor_page(records(101, 7), Some("same"), true)),
    ]);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(50, 10_000, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.record_count(), 107);
}

#[tokio::test]
async fn test_cursor_empty_page_with_more_announced() {
    let source = ScriptedCursor::new(vec![
        Ok(cursor_page(records(1, 100), Some("c1"), true)),
        Ok(cursor_page(Vec::new(), Some("c2"), true)),
    ]);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(50, 10_000, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.interruption(), Some(InterruptionReason::EmptyPage));
    assert_eq!(outcome.record_count(), 100);
}

#[tokio::test]
async fn test_cursor_failures_open_the_breaker() {
    let breakers = SourceBreakers::new(2);
    let (_tx, rx) = watch::channel(false);
    let spec = EntityKind::Freights.spec();

    for _ in 0..2 {
        let source = ScriptedCursor::new(vec![Err(ApiError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        })]);
        let outcome = drive_cursor(
            &source,
            spec,
            &freights_window(),
            &limits(50, 10_000, 100),
            &breakers,
            &rx,
        )
        .await
        .unwrap();
        assert_eq!(outcome.interruption(), Some(InterruptionReason::ApiError));
        assert!(outcome.error().unwrap().contains("503"));
    }
    assert!(breakers.is_open(EntityKind::Freights));

    let source = ScriptedCursor::new(vec![Ok(cursor_page(records(1, 3), None, false))]);
    let outcome = drive_cursor(
        &source,
        spec,
        &freights_window(),
        &limits(50, 10_000, 100),
        &breakers,
        &rx,
    )
    .await
    .unwrap();
    assert_eq!(outcome.interruption(), Some(InterruptionReason::CircuitBreaker));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_cursor_shutdown_aborts() {
    let source = ScriptedCursor::new(vec![Ok(cursor_page(records(1, 3), None, false))]);
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let err = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(50, 10_000, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TallyError::Interrupted(_)));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_pointer_empty_page_completes() {
    let source = ScriptedPointer::paged(records(1, 250), 100);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_pointer(
        &source,
        EntityKind::Occurrences.spec(),
        &occurrences_window(),
        &limits(50, 10_000, 100),
        &rx,
    )
    .await
    .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.record_count(), 250);
    assert_eq!(outcome.pages_processed(), 4);
    let requested = source.requested.lock().unwrap();
    assert_eq!(requested[0], None);
    assert_eq!(requested[1].as_deref(), Some("100"));
    assert_eq!(requested[3].as_deref(), Some("250"));
}

#[tokio::test]
async fn test_pointer_missing_marker_completes() {
    let source = ScriptedPointer::new(vec![Ok(pointer_page(records(1, 10), None))]);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_pointer(
        &source,
        EntityKind::Occurrences.spec(),
        &occurrences_window(),
        &limits(50, 10_000, 100),
        &rx,
    )
    .await
    .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.pages_processed(), 1);
}

#[tokio::test]
async fn test_pointer_repeated_marker_is_a_loop() {
    let source = ScriptedPointer::new(vec![
        Ok(pointer_page(records(1, 10), Some("10"))),
        Ok(pointer_page(records(11, 10), Some("20"))),
        Ok(pointer_page(records(21, 10), Some("10"))),
    ]);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_pointer(
        &source,
        EntityKind::Occurrences.spec(),
        &occurrences_window(),
        &limits(50, 10_000, 100),
        &rx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.interruption(), Some(InterruptionReason::LoopDetected));
    assert_eq!(outcome.record_count(), 30);
}

#[tokio::test]
async fn test_pointer_page_ceiling() {
    let source = ScriptedPointer::paged(records(1, 1000), 100);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_pointer(
        &source,
        EntityKind::Occurrences.spec(),
        &occurrences_window(),
        &limits(3, 10_000, 100),
        &rx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.interruption(), Some(InterruptionReason::PageLimit));
    assert_eq!(outcome.record_count(), 300);
}

#[tokio::test]
async fn test_cursor_trail_records_each_request_including_the_failure() {
    let source = ScriptedCursor::new(vec![
        Ok(cursor_page(records(1, 100), Some("c1"), true)),
        Ok(cursor_page(records(101, 100), Some("c2"), true)),
        Err(ApiError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        }),
    ]);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_cursor(
        &source,
        EntityKind::Freights.spec(),
        &freights_window(),
        &limits(10, 10_000, 100),
        &SourceBreakers::new(3),
        &rx,
    )
    .await
    .unwrap();

    assert_eq!(outcome.interruption(), Some(InterruptionReason::ApiError));
    let trail = outcome.page_trail();
    assert_eq!(trail.len(), 3);
    assert_eq!(trail[0].marker, None);
    assert_eq!(trail[0].records, 100);
    assert_eq!((trail[0].key_min, trail[0].key_max), (Some(1), Some(100)));
    assert_eq!(trail[1].marker.as_deref(), Some("c1"));
    assert_eq!(trail[1].key_min, Some(101));
    assert_eq!(trail[2].page, 3);
    assert_eq!(trail[2].marker.as_deref(), Some("c2"));
    assert_eq!(trail[2].status, PageStatus::Failed);
    assert_eq!(trail[2].http_status, Some(503));
    assert_eq!(trail[2].records, 0);
}

#[tokio::test]
async fn test_pointer_trail_matches_pages_processed() {
    let source = ScriptedPointer::paged(records(1, 250), 100);
    let (_tx, rx) = watch::channel(false);

    let outcome = drive_pointer(
        &source,
        EntityKind::Occurrences.spec(),
        &occurrences_window(),
        &limits(50, 10_000, 100),
        &rx,
    )
    .await
    .unwrap();

    let trail = outcome.page_trail();
    assert_eq!(trail.len() as u32, outcome.pages_processed());
    let pages: Vec<u32> = trail.iter().map(|p| p.page).collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
    let sizes: Vec<usize> = trail.iter().map(|p| p.records).collect();
    assert_eq!(sizes, vec![100, 100, 50, 0]);
    assert_eq!(trail[3].marker.as_deref(), Some("250"));
    assert!(trail.iter().all(|p| p.status == PageStatus::Ok));
    assert_ne!(trail[0].response_hash, trail[1].response_hash);
}

struct FixedBulk(usize);

#[async_trait]
impl BulkSource for FixedBulk {
    async fn fetch_range(
        &self,
        _spec: &'static EntitySpec,
        _window: &ExtractionWindow,
        _max_records: usize,
    ) -> Result<Vec<Value>, ApiError> {
        Ok(records(1, self.0))
    }
}

#[tokio::test]
async fn test_bulk_result_at_ceiling_is_incomplete() {
    let (_tx, rx) = watch::channel(false);
    let window = ExtractionWindow::for_day(EntityKind::Quotes, day(2025, 3, 10));
    let spec = EntityKind::Quotes.spec();

    let full = drive_bulk(&FixedBulk(500), spec, &window, &limits(1, 500, 100), &rx)
        .await
        .unwrap();
    assert_eq!(full.interruption(), Some(InterruptionReason::RecordLimit));

    let partial = drive_bulk(&FixedBulk(499), spec, &window, &limits(1, 500, 100), &rx)
        .await
        .unwrap();
    assert!(partial.is_complete());
    assert_eq!(partial.pages_processed(), 1);
}
