//! Progress counters shared by the producer, the workers and the heartbeat

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct EnrichmentCounters {
    enqueued: AtomicUsize,
    processed: AtomicUsize,
    enriched: AtomicUsize,
    fields_merged: AtomicUsize,
    lookup_errors: AtomicUsize,
    shutdowns_observed: AtomicUsize,
    backoffs: AtomicUsize,
    heartbeats: AtomicUsize,
}

impl EnrichmentCounters {
    pub fn task_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the running total of processed tasks
    pub fn task_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_enriched(&self, fields: usize) {
        self.enriched.fetch_add(1, Ordering::Relaxed);
        self.fields_merged.fetch_add(fields, Ordering::Relaxed);
    }

    pub fn lookup_failed(&self) {
        self.lookup_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped(&self) {
        self.shutdowns_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn backed_off(&self) {
        self.backoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, candidates: usize, workers: usize) -> EnrichmentStats {
        EnrichmentStats {
            candidates,
            workers,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            enriched: self.enriched.load(Ordering::Relaxed),
            fields_merged: self.fields_merged.load(Ordering::Relaxed),
            lookup_errors: self.lookup_errors.load(Ordering::Relaxed),
            shutdowns_observed: self.shutdowns_observed.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of an enrichment run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    /// Records that were missing at least one enrichment field
    pub candidates: usize,
    pub workers: usize,
    pub enqueued: usize,
    pub processed: usize,
    /// Records that received at least one field
    pub enriched: usize,
    pub fields_merged: usize,
    pub lookup_errors: usize,
    /// Workers that saw their queue close
    pub shutdowns_observed: usize,
    /// Extra pauses taken after a run of failed lookups
    pub backoffs: usize,
    pub heartbeats: usize,
}

impl EnrichmentStats {
    pub fn pending(&self) -> usize {
        self.enqueued.saturating_sub(self.processed)
    }

    pub fn log_summary(&self, entity: &str) {
        tracing::info!(
            entity,
            candidates = self.candidates,
            workers = self.workers,
            processed = self.processed,
            enriched = self.enriched,
            fields_merged = self.fields_merged,
            lookup_errors = self.lookup_errors,
            backoffs = self.backoffs,
            "Enrichment finished"
        );
    }
}
