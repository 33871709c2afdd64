// Tally - Extraction, Reconciliation and Audit ETL Tool
// Copyright (c) 2025 Tally Contributors
// Licensed under the MIT License

//! # Tally - Extraction, Reconciliation and Audit ETL
//!
//! Tally pulls operational records (freights, invoices, manifests, pickups,
//! quotes and friends) out of a remote logistics API, persists them into
//! PostgreSQL, records every run in an append-only extraction log and audits
//! the result.
//!
//! ## Overview
//!
//! - **Paginating** three listing styles: GraphQL cursors, REST page pointers
//!   and bulk data-export templates, each bounded by page and record ceilings
//! - **Enriching** records that need a secondary lookup through a bounded,
//!   key-sharded worker pool
//! - **Reconciling** each run into a closed status taxonomy written to the
//!   extraction log
//! - **Auditing** an execution window: schema, counts, keys, references and
//!   id gaps
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Pagination, enrichment, extraction, reconciliation, audit
//! - [`adapters`] - The operational API and PostgreSQL
//! - [`domain`] - Entity registry, windows, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally::adapters::database::create_stores;
//! use tally::config::load_config;
//! use tally::core::audit::AuditEngine;
//! use tally::core::cycle::{CycleRange, ExtractionCycle};
//! use tally::core::extraction::ExtractorRegistry;
//! use tally::core::reconciliation::{ExtractionRunner, InvalidTolerance};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("tally.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let stores = create_stores(&config.postgresql).await?;
//!     let registry = ExtractorRegistry::from_config(&config, stores.records.clone(), shutdown_rx.clone())?;
//!     let runner = ExtractionRunner::new(stores.log.clone(), InvalidTolerance::from(&config.tolerance));
//!     let audit = AuditEngine::new(stores.audit.clone(), stores.log.clone(), &config.audit);
//!
//!     let cycle = ExtractionCycle::new(
//!         Arc::new(registry),
//!         Arc::new(runner),
//!         config.audit.default_entities(),
//!         shutdown_rx,
//!     )
//!     .with_audit(Arc::new(audit));
//!
//!     let summary = cycle.run_once(CycleRange::TrailingDay).await?;
//!     println!("{} complete, {} incomplete", summary.complete_runs(), summary.incomplete_runs());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::Result`], backed by [`domain::TallyError`];
//! the CLI layer converts into `anyhow` and maps failures onto exit codes.
//!
//! ## Logging
//!
//! ```rust,no_run
//! tracing::info!(entity = "invoices", "Starting extraction");
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
