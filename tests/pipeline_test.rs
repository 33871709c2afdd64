//! Integration tests for the enrichment pipeline
//!
//! These tests verify that:
//! - Every enqueued task is processed exactly once
//! - Every worker observes the close of its queue
//! - Slow workers apply backpressure without losing tasks
//! - Shutdown stops the producer and fails the call

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tally::adapters::sources::LookupSource;
use tally::config::EnrichmentConfig;
use tally::core::enrichment::EnrichmentPipeline;
use tally::domain::{ApiError, EntityKind, EntitySpec, RecordKey, TallyError};
use tokio::sync::watch;

/// Answers every lookup and counts calls per key
#[derive(Default)]
struct CountingLookup {
    calls: Mutex<HashMap<String, usize>>,
    fail_every: Option<usize>,
    total: AtomicUsize,
    shutdown_after: Option<(usize, watch::Sender<bool>)>,
}

#[async_trait]
impl LookupSource for CountingLookup {
    async fn lookup(
        &self,
        _spec: &'static EntitySpec,
        key: &RecordKey,
    ) -> Result<Option<Value>, ApiError> {
        let n = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .calls
            .lock()
            .unwrap()
            .entry(key.as_str().to_string())
            .or_insert(0) += 1;

        if let Some((after, tx)) = &self.shutdown_after {
            if n == *after {
                let _ = tx.send(true);
            }
        }
        if self.fail_every.is_some_and(|every| n % every == 0) {
            return Err(ApiError::Timeout(format!("lookup {key}")));
        }
        Ok(Some(json!({
            "nfseNumber": format!("NFSE-{key}"),
            "bankAccountId": 7,
            "paymentMethod": "boleto"
        })))
    }
}

fn invoices(count: usize) -> Vec<Value> {
    (1..=count).map(|i| json!({"id": i, "document": format!("F-{i}")})).collect()
}

fn config(workers: usize, queue_capacity: usize) -> EnrichmentConfig {
    EnrichmentConfig {
        workers,
        queue_capacity,
        heartbeat_seconds: 0,
        breaker_backoff_ms: 1,
        shutdown_timeout_secs: 30,
        ..EnrichmentConfig::default()
    }
}

#[tokio::test]
async fn test_every_task_processed_once_with_slow_workers() {
    let (_tx, rx) = watch::channel(false);
    let lookup = Arc::new(CountingLookup::default());
    let pipeline = EnrichmentPipeline::new(lookup.clone(), config(4, 4), rx)
        .with_merge_delay(Duration::from_millis(2));

    let result = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(200))
        .await
        .unwrap();

    let calls = lookup.calls.lock().unwrap();
    assert_eq!(calls.len(), 200);
    assert!(calls.values().all(|&c| c == 1));

    assert_eq!(result.stats.candidates, 200);
    assert_eq!(result.stats.enqueued, 200);
    assert_eq!(result.stats.processed, 200);
    assert_eq!(result.stats.enriched, 200);
    assert_eq!(result.stats.pending(), 0);
    assert_eq!(result.stats.workers, 4);
    assert_eq!(result.stats.shutdowns_observed, 4);

    for (i, record) in result.records.iter().enumerate() {
        assert_eq!(record["id"], json!(i + 1));
        assert_eq!(record["nfseNumber"], format!("NFSE-{}", i + 1));
        assert_eq!(record["document"], format!("F-{}", i + 1));
    }
}

#[tokio::test]
async fn test_workers_capped_by_candidates() {
    let (_tx, rx) = watch::channel(false);
    let pipeline = EnrichmentPipeline::new(Arc::new(CountingLookup::default()), config(8, 16), rx);

    let result = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(3))
        .await
        .unwrap();

    assert_eq!(result.stats.workers, 3);
    assert_eq!(result.stats.shutdowns_observed, 3);
    assert_eq!(result.stats.processed, 3);
}

#[tokio::test]
async fn test_failed_lookups_keep_records_as_listed() {
    let (_tx, rx) = watch::channel(false);
    let lookup = Arc::new(CountingLookup {
        fail_every: Some(5),
        ..CountingLookup::default()
    });
    let pipeline = EnrichmentPipeline::new(lookup, config(3, 6), rx);

    let result = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(50))
        .await
        .unwrap();

    assert_eq!(result.stats.lookup_errors, 10);
    assert_eq!(result.stats.processed, 50);
    assert_eq!(result.stats.enriched, 40);
    let untouched = result
        .records
        .iter()
        .filter(|r| r.get("nfseNumber").is_none())
        .count();
    assert_eq!(untouched, 10);
}

#[tokio::test]
async fn test_shutdown_mid_run_fails_the_call() {
    let (tx, rx) = watch::channel(false);
    let lookup = Arc::new(CountingLookup {
        shutdown_after: Some((10, tx)),
        ..CountingLookup::default()
    });
    let pipeline = EnrichmentPipeline::new(lookup.clone(), config(2, 4), rx);

    let err = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(100))
        .await
        .unwrap_err();

    assert!(matches!(err, TallyError::Interrupted(_)));
    assert_eq!(lookup.total.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_entities_without_enrichment_fields_pass_through() {
    let (_tx, rx) = watch::channel(false);
    let lookup = Arc::new(CountingLookup::default());
    let pipeline = EnrichmentPipeline::new(lookup.clone(), config(2, 4), rx);

    let records = invoices(5);
    let result = pipeline
        .enrich(EntityKind::Freights.spec(), records.clone())
        .await
        .unwrap();

    assert_eq!(result.records, records);
    assert_eq!(lookup.total.load(Ordering::SeqCst), 0);
}

/// Fails the lookups whose 1-based call number is listed, optionally taking
/// `latency` per call
struct PatternLookup {
    failing_calls: Vec<usize>,
    latency: Duration,
    total: AtomicUsize,
}

impl PatternLookup {
    fn new(failing_calls: Vec<usize>, latency: Duration) -> Self {
        Self {
            failing_calls,
            latency,
            total: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LookupSource for PatternLookup {
    async fn lookup(
        &self,
        _spec: &'static EntitySpec,
        key: &RecordKey,
    ) -> Result<Option<Value>, ApiError> {
        let n = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing_calls.contains(&n) {
            return Err(ApiError::ServerError {
                status: 503,
                message: format!("lookup {key}"),
            });
        }
        Ok(Some(json!({"nfseNumber": format!("NFSE-{key}")})))
    }
}

fn backoff_config() -> EnrichmentConfig {
    EnrichmentConfig {
        workers: 1,
        queue_capacity: 8,
        heartbeat_seconds: 0,
        consecutive_error_limit: 2,
        breaker_backoff_ms: 10_000,
        delay_multiplier: 1.0,
        shutdown_timeout_secs: 600,
        ..EnrichmentConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_failures_trigger_backoff() {
    let (_tx, rx) = watch::channel(false);
    // Two streaks of two failures each
    let lookup = Arc::new(PatternLookup::new(vec![2, 3, 5, 6], Duration::ZERO));
    let pipeline = EnrichmentPipeline::new(lookup, backoff_config(), rx);

    let started = tokio::time::Instant::now();
    let result = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(8))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.stats.lookup_errors, 4);
    assert_eq!(result.stats.backoffs, 2);
    assert!(elapsed >= Duration::from_secs(20), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(30), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_success_between_failures_resets_the_streak() {
    let (_tx, rx) = watch::channel(false);
    let lookup = Arc::new(PatternLookup::new(vec![1, 3, 5, 7], Duration::ZERO));
    let pipeline = EnrichmentPipeline::new(lookup, backoff_config(), rx);

    let started = tokio::time::Instant::now();
    let result = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(8))
        .await
        .unwrap();

    assert_eq!(result.stats.lookup_errors, 4);
    assert_eq!(result.stats.backoffs, 0);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_long_failure_streak_pauses_once_per_limit() {
    let (_tx, rx) = watch::channel(false);
    let lookup = Arc::new(PatternLookup::new((1..=5).collect(), Duration::ZERO));
    let pipeline = EnrichmentPipeline::new(lookup, backoff_config(), rx);

    let result = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(5))
        .await
        .unwrap();

    // Failures 2 and 4 reach the limit; the fifth starts a new streak
    assert_eq!(result.stats.backoffs, 2);
    assert_eq!(result.stats.enriched, 0);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_reports_while_lookups_are_slow() {
    let (_tx, rx) = watch::channel(false);
    let lookup = Arc::new(PatternLookup::new(vec![], Duration::from_secs(3)));
    let pipeline = EnrichmentPipeline::new(
        lookup,
        EnrichmentConfig {
            heartbeat_seconds: 1,
            ..backoff_config()
        },
        rx,
    );

    let result = pipeline
        .enrich(EntityKind::Invoices.spec(), invoices(3))
        .await
        .unwrap();

    assert_eq!(result.stats.enriched, 3);
    // Nine seconds of lookups at a one-second period
    assert!(result.stats.heartbeats >= 7, "heartbeats {}", result.stats.heartbeats);
    assert!(result.stats.heartbeats <= 9, "heartbeats {}", result.stats.heartbeats);
}
