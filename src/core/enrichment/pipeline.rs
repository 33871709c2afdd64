//! Producer/worker enrichment pipeline
//!
//! One producer performs the secondary lookups strictly in sequence, so every
//! call goes through the shared request channel one at a time. Workers only
//! merge payloads. Records are sharded across workers by key hash, so each
//! worker owns its records outright and no per-record lock is needed. Each
//! worker has its own bounded queue; closing the queues signals shutdown.

use super::stats::{EnrichmentCounters, EnrichmentStats};
use super::task::{merge_missing_fields, needs_enrichment, shard_for, EnrichmentTask};
use crate::adapters::sources::LookupSource;
use crate::config::EnrichmentConfig;
use crate::domain::{EntityKind, EntitySpec, RecordKey, Result, TallyError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Records after enrichment, in their original order
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub records: Vec<Value>,
    pub stats: EnrichmentStats,
}

struct Candidate {
    slot: usize,
    key: RecordKey,
    shard: usize,
}

type Partition = HashMap<usize, Value>;

pub struct EnrichmentPipeline {
    lookup: Arc<dyn LookupSource>,
    config: EnrichmentConfig,
    shutdown: watch::Receiver<bool>,
    merge_delay: Option<Duration>,
}

impl EnrichmentPipeline {
    pub fn new(
        lookup: Arc<dyn LookupSource>,
        config: EnrichmentConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            lookup,
            config,
            shutdown,
            merge_delay: None,
        }
    }

    /// Slows every merge by `delay`, to exercise backpressure
    pub fn with_merge_delay(mut self, delay: Duration) -> Self {
        self.merge_delay = Some(delay);
        self
    }

    /// Fills the entity's enrichment fields on every record missing them.
    ///
    /// Failed lookups leave the record as it was and are counted. Only a
    /// shutdown request, a closed queue or a worker-pool timeout fail the call.
    pub async fn enrich(
        &self,
        spec: &'static EntitySpec,
        mut records: Vec<Value>,
    ) -> Result<EnrichmentResult> {
        let fields = spec.enrichment_fields;
        let candidates: Vec<(usize, RecordKey)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| !fields.is_empty() && needs_enrichment(record, fields))
            .filter_map(|(slot, record)| spec.natural_key(record).map(|key| (slot, key)))
            .collect();

        if candidates.is_empty() {
            tracing::debug!(entity = %spec.kind, "No records need enrichment");
            return Ok(EnrichmentResult {
                records,
                stats: EnrichmentStats::default(),
            });
        }

        let workers = self.config.workers.min(candidates.len()).max(1);
        let capacity = (self.config.queue_capacity / workers).max(1);
        let candidate_count = candidates.len();
        let counters = Arc::new(EnrichmentCounters::default());

        let mut partitions: Vec<Partition> = (0..workers).map(|_| HashMap::new()).collect();
        let mut plan = Vec::with_capacity(candidate_count);
        for (slot, key) in candidates {
            let shard = shard_for(&key, workers);
            partitions[shard].insert(slot, std::mem::take(&mut records[slot]));
            plan.push(Candidate { slot, key, shard });
        }

        tracing::info!(
            entity = %spec.kind,
            candidates = candidate_count,
            workers,
            queue_capacity = capacity * workers,
            "Starting enrichment"
        );

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for (index, partition) in partitions.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                WorkerContext {
                    index,
                    kind: spec.kind,
                    fields,
                    counters: counters.clone(),
                    progress_interval: self.config.progress_interval,
                    merge_delay: self.merge_delay,
                },
                rx,
                partition,
            )));
        }

        let heartbeat = self.spawn_heartbeat(spec.kind, counters.clone(), candidate_count, workers);

        let producer = tokio::spawn(produce(Producer {
            lookup: self.lookup.clone(),
            spec,
            plan,
            senders,
            counters: counters.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }));

        let produced = match producer.await {
            Ok(result) => result,
            Err(e) => Err(TallyError::Enrichment(format!("Producer task failed: {e}"))),
        };
        let joined = self.join_workers(handles).await;
        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }

        produced?;
        for partition in joined? {
            for (slot, record) in partition {
                records[slot] = record;
            }
        }

        let stats = counters.snapshot(candidate_count, workers);
        stats.log_summary(spec.kind.as_str());
        Ok(EnrichmentResult { records, stats })
    }

    async fn join_workers(&self, handles: Vec<JoinHandle<Partition>>) -> Result<Vec<Partition>> {
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);

        match tokio::time::timeout(timeout, futures::future::join_all(handles)).await {
            Ok(results) => results
                .into_iter()
                .map(|r| r.map_err(|e| TallyError::Enrichment(format!("Worker task failed: {e}"))))
                .collect(),
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                tracing::error!(
                    timeout_secs = self.config.shutdown_timeout_secs,
                    "Enrichment workers did not finish in time, forcing shutdown"
                );
                Err(TallyError::Enrichment(format!(
                    "Workers did not finish within {}s",
                    self.config.shutdown_timeout_secs
                )))
            }
        }
    }

    fn spawn_heartbeat(
        &self,
        kind: EntityKind,
        counters: Arc<EnrichmentCounters>,
        candidates: usize,
        workers: usize,
    ) -> Option<JoinHandle<()>> {
        if self.config.heartbeat_seconds == 0 {
            return None;
        }
        let period = Duration::from_secs(self.config.heartbeat_seconds);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                counters.heartbeat();
                let stats = counters.snapshot(candidates, workers);
                tracing::info!(
                    entity = %kind,
                    processed = stats.processed,
                    pending = stats.pending(),
                    enriched = stats.enriched,
                    lookup_errors = stats.lookup_errors,
                    "Enrichment heartbeat"
                );
            }
        }))
    }
}

struct Producer {
    lookup: Arc<dyn LookupSource>,
    spec: &'static EntitySpec,
    plan: Vec<Candidate>,
    senders: Vec<mpsc::Sender<EnrichmentTask>>,
    counters: Arc<EnrichmentCounters>,
    config: EnrichmentConfig,
    shutdown: watch::Receiver<bool>,
}

/// Issues lookups in order and routes each outcome to the owning worker.
/// Returning drops the senders, which closes every worker queue.
async fn produce(producer: Producer) -> Result<()> {
    let Producer {
        lookup,
        spec,
        plan,
        senders,
        counters,
        config,
        shutdown,
    } = producer;

    let pause = Duration::from_millis((config.breaker_backoff_ms as f64 * config.delay_multiplier) as u64);
    let mut consecutive_errors: u32 = 0;

    for candidate in plan {
        if *shutdown.borrow() {
            tracing::warn!(entity = %spec.kind, "Shutdown requested, stopping enrichment producer");
            return Err(TallyError::Interrupted(format!(
                "Enrichment of {} interrupted by shutdown",
                spec.kind
            )));
        }

        let detail = match lookup.lookup(spec, &candidate.key).await {
            Ok(detail) => {
                consecutive_errors = 0;
                detail
            }
            Err(e) => {
                counters.lookup_failed();
                consecutive_errors += 1;
                tracing::warn!(
                    entity = %spec.kind,
                    key = %candidate.key,
                    consecutive_errors,
                    error = %e,
                    "Enrichment lookup failed, keeping record as listed"
                );
                if consecutive_errors >= config.consecutive_error_limit {
                    tracing::warn!(
                        entity = %spec.kind,
                        consecutive_errors,
                        pause_ms = pause.as_millis() as u64,
                        "Too many consecutive lookup errors, backing off"
                    );
                    tokio::time::sleep(pause).await;
                    counters.backed_off();
                    // A further streak of the same length is needed before the next pause
                    consecutive_errors = 0;
                }
                None
            }
        };

        let task = EnrichmentTask {
            slot: candidate.slot,
            key: candidate.key,
            detail,
        };
        senders[candidate.shard].send(task).await.map_err(|e| {
            TallyError::Enrichment(format!(
                "Queue for worker {} closed before task {} was delivered",
                candidate.shard, e.0.key
            ))
        })?;
        counters.task_enqueued();
    }

    Ok(())
}

struct WorkerContext {
    index: usize,
    kind: EntityKind,
    fields: &'static [&'static str],
    counters: Arc<EnrichmentCounters>,
    progress_interval: usize,
    merge_delay: Option<Duration>,
}

async fn run_worker(
    ctx: WorkerContext,
    mut queue: mpsc::Receiver<EnrichmentTask>,
    mut partition: Partition,
) -> Partition {
    while let Some(task) = queue.recv().await {
        if let Some(delay) = ctx.merge_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(detail) = task.detail.as_ref() {
            match partition.get_mut(&task.slot) {
                Some(record) => {
                    let merged = merge_missing_fields(record, detail, ctx.fields);
                    if merged > 0 {
                        ctx.counters.record_enriched(merged);
                    }
                }
                None => tracing::warn!(
                    entity = %ctx.kind,
                    worker = ctx.index,
                    key = %task.key,
                    "Task routed to a worker that does not own the record"
                ),
            }
        }

        let processed = ctx.counters.task_processed();
        if ctx.progress_interval > 0 && processed % ctx.progress_interval == 0 {
            tracing::info!(entity = %ctx.kind, processed, "Enrichment progress");
        }
    }

    ctx.counters.worker_stopped();
    tracing::debug!(entity = %ctx.kind, worker = ctx.index, "Queue closed, worker stopping");
    partition
}
