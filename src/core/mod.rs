//! Core business logic for Tally.
//!
//! # Modules
//!
//! - [`pagination`] - Cursor, pointer and bulk drivers with their ceilings and loop guards
//! - [`enrichment`] - Producer and sharded worker pool for secondary lookups
//! - [`extraction`] - The `extract`/`persist` contract and deduplication
//! - [`reconciliation`] - Run status taxonomy and the extraction log
//! - [`audit`] - Post-run completeness and integrity checks
//! - [`cycle`] - One pass over every entity followed by the audit
//!
//! # Run Workflow
//!
//! 1. **Extract**: drive the entity's listing, then enrich if it needs it
//! 2. **Persist**: deduplicate by natural key and upsert in one transaction
//! 3. **Reconcile**: classify the run and append one extraction log row
//! 4. **Audit**: cross-check the log against persisted rows
//!
//! # Example
//!
//! ```rust,no_run
//! use tally::adapters::database::create_stores;
//! use tally::config::load_config;
//! use tally::core::extraction::ExtractorRegistry;
//! use tally::core::reconciliation::{ExtractionRunner, InvalidTolerance};
//! use tally::domain::{EntityKind, ExtractionWindow};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tally.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let stores = create_stores(&config.postgresql).await?;
//! let registry = ExtractorRegistry::from_config(&config, stores.records.clone(), shutdown_rx)?;
//! let runner = ExtractionRunner::new(stores.log.clone(), InvalidTolerance::from(&config.tolerance));
//!
//! let window = ExtractionWindow::trailing_day(EntityKind::Freights, chrono::Utc::now().date_naive());
//! let report = runner.run(registry.get(EntityKind::Freights)?.as_ref(), &window).await?;
//! println!("{}: {}", report.entity, report.status);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cycle;
pub mod enrichment;
pub mod extraction;
pub mod pagination;
pub mod reconciliation;
