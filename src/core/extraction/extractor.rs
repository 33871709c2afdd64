//! The extraction contract and its standard implementation

use super::dedup::prepare_batch;
use super::outcome::{ExtractionOutcome, SaveMetrics};
use crate::adapters::database::RecordStore;
use crate::adapters::http::{ApiClient, RateLimitedChannel};
use crate::adapters::sources::{
    BulkSource, CursorSource, DataExportSource, GraphQlSource, PointerSource, RestSource,
};
use crate::config::TallyConfig;
use crate::core::enrichment::EnrichmentPipeline;
use crate::core::pagination::{drive_bulk, drive_cursor, drive_pointer, PageLimits, SourceBreakers};
use crate::domain::{EntityKind, EntitySpec, ExtractionWindow, PaginationMode, Result, TallyError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// What every entity kind offers to runners
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    fn kind(&self) -> EntityKind;

    /// Pulls the window from the remote source.
    ///
    /// Ceilings, loop guards and remote failures come back as an incomplete
    /// outcome. Only shutdown and enrichment-pool failures are errors.
    async fn extract(&self, window: &ExtractionWindow) -> Result<ExtractionOutcome>;

    /// Deduplicates and upserts records.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails; nothing is retried.
    async fn persist(&self, records: Vec<Value>) -> Result<SaveMetrics>;
}

/// The pagination discipline an extractor drives
#[derive(Clone)]
pub enum SourceDriver {
    Cursor(Arc<dyn CursorSource>),
    Pointer(Arc<dyn PointerSource>),
    Bulk(Arc<dyn BulkSource>),
}

/// Registry-driven extractor shared by every entity kind
pub struct StandardExtractor {
    spec: &'static EntitySpec,
    driver: SourceDriver,
    enrichment: Option<Arc<EnrichmentPipeline>>,
    store: Arc<dyn RecordStore>,
    limits: PageLimits,
    breakers: Arc<SourceBreakers>,
    shutdown: watch::Receiver<bool>,
    dry_run: bool,
}

impl StandardExtractor {
    pub fn new(
        kind: EntityKind,
        driver: SourceDriver,
        store: Arc<dyn RecordStore>,
        limits: PageLimits,
        breakers: Arc<SourceBreakers>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            spec: kind.spec(),
            driver,
            enrichment: None,
            store,
            limits,
            breakers,
            shutdown,
            dry_run: false,
        }
    }

    pub fn with_enrichment(mut self, pipeline: Arc<EnrichmentPipeline>) -> Self {
        self.enrichment = Some(pipeline);
        self
    }

    /// Skip writes; `persist` reports every unique record as persisted
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn spec(&self) -> &'static EntitySpec {
        self.spec
    }
}

#[async_trait]
impl EntityExtractor for StandardExtractor {
    fn kind(&self) -> EntityKind {
        self.spec.kind
    }

    async fn extract(&self, window: &ExtractionWindow) -> Result<ExtractionOutcome> {
        if window.kind() != self.spec.kind {
            return Err(TallyError::Validation(format!(
                "Window for {} passed to the {} extractor",
                window.kind(),
                self.spec.kind
            )));
        }

        let started = Instant::now();
        let outcome = match &self.driver {
            SourceDriver::Cursor(source) => {
                drive_cursor(
                    source.as_ref(),
                    self.spec,
                    window,
                    &self.limits,
                    &self.breakers,
                    &self.shutdown,
                )
                .await?
            }
            SourceDriver::Pointer(source) => {
                drive_pointer(source.as_ref(), self.spec, window, &self.limits, &self.shutdown).await?
            }
            SourceDriver::Bulk(source) => {
                drive_bulk(source.as_ref(), self.spec, window, &self.limits, &self.shutdown).await?
            }
        };

        tracing::info!(
            entity = %self.spec.kind,
            records = outcome.record_count(),
            pages = outcome.pages_processed(),
            complete = outcome.is_complete(),
            interruption = ?outcome.interruption(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Listing finished"
        );

        match &self.enrichment {
            Some(pipeline) if self.spec.is_enriched() && outcome.record_count() > 0 => {
                let records = outcome.records().to_vec();
                let enriched = pipeline.enrich(self.spec, records).await?;
                Ok(outcome.replace_records(enriched.records))
            }
            _ => Ok(outcome),
        }
    }

    async fn persist(&self, records: Vec<Value>) -> Result<SaveMetrics> {
        let batch = prepare_batch(self.spec, records);
        let unique = batch.records.len();

        if self.dry_run {
            tracing::info!(
                entity = %self.spec.kind,
                unique,
                invalid = batch.invalid,
                "DRY RUN: Would upsert {} records into {}",
                unique,
                self.spec.table
            );
            return Ok(SaveMetrics::new(unique, unique, batch.invalid));
        }

        let written = self
            .store
            .upsert(self.spec, &batch.records, Utc::now())
            .await?;
        Ok(SaveMetrics::new(written, unique, batch.invalid))
    }
}

/// Extractors by entity kind
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: BTreeMap<EntityKind, Arc<dyn EntityExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires every entity kind to its remote source over one shared request channel
    pub fn from_config(
        config: &TallyConfig,
        store: Arc<dyn RecordStore>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let channel = Arc::new(RateLimitedChannel::new(config.api.rate_limit.clone()));
        let client = ApiClient::new(&config.api, channel)?;

        let graphql = Arc::new(GraphQlSource::new(client.clone()));
        let rest = Arc::new(RestSource::new(client.clone()));
        let export = Arc::new(DataExportSource::new(client));
        let breakers = Arc::new(SourceBreakers::new(config.pagination.source_breaker_threshold));
        let enrichment = Arc::new(EnrichmentPipeline::new(
            graphql.clone(),
            config.enrichment.clone(),
            shutdown.clone(),
        ));

        let mut registry = Self::new();
        for kind in EntityKind::ALL {
            let spec = kind.spec();
            let driver = match spec.pagination {
                PaginationMode::Cursor => SourceDriver::Cursor(graphql.clone()),
                PaginationMode::Pointer => SourceDriver::Pointer(rest.clone()),
                PaginationMode::Bulk => SourceDriver::Bulk(export.clone()),
            };
            let limits = PageLimits::for_kind(&config.pagination, &config.api.rate_limit, kind);

            let mut extractor = StandardExtractor::new(
                kind,
                driver,
                store.clone(),
                limits,
                breakers.clone(),
                shutdown.clone(),
            )
            .dry_run(config.application.dry_run);
            if spec.is_enriched() {
                extractor = extractor.with_enrichment(enrichment.clone());
            }
            registry.register(Arc::new(extractor));
        }

        Ok(registry)
    }

    pub fn register(&mut self, extractor: Arc<dyn EntityExtractor>) {
        self.extractors.insert(extractor.kind(), extractor);
    }

    pub fn get(&self, kind: EntityKind) -> Result<Arc<dyn EntityExtractor>> {
        self.extractors
            .get(&kind)
            .cloned()
            .ok_or_else(|| TallyError::Extraction(format!("No extractor registered for {kind}")))
    }

    pub fn kinds(&self) -> Vec<EntityKind> {
        self.extractors.keys().copied().collect()
    }

    pub async fn extract(&self, kind: EntityKind, window: &ExtractionWindow) -> Result<ExtractionOutcome> {
        self.get(kind)?.extract(window).await
    }

    pub async fn persist(&self, kind: EntityKind, records: Vec<Value>) -> Result<SaveMetrics> {
        self.get(kind)?.persist(records).await
    }
}
