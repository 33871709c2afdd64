//! Extract command implementation
//!
//! Runs the configured entities once (or in a loop), records every run in
//! the extraction log and audits each cycle.

use super::parse_entities;
use crate::adapters::database::create_stores;
use crate::config::load_config;
use crate::core::audit::AuditEngine;
use crate::core::cycle::{CycleRange, CycleSummary, ExtractionCycle, LoopReconciler};
use crate::core::extraction::ExtractorRegistry;
use crate::core::reconciliation::{ExtractionRunner, InvalidTolerance};
use crate::domain::EntityKind;
use chrono::NaiveDate;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the extract command
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Entities to extract (comma-separated, default all)
    #[arg(long)]
    pub entity: Option<String>,

    /// First day of the data range (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the data range (YYYY-MM-DD, defaults to --start)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Repeat cycles until interrupted
    #[arg(long = "loop")]
    pub loop_mode: bool,

    /// Pause between loop cycles
    #[arg(long, default_value_t = 3600)]
    pub interval_secs: u64,

    /// Dry run mode - extract without writing to the database
    #[arg(long)]
    pub dry_run: bool,

    /// Do not audit after each cycle
    #[arg(long)]
    pub skip_audit: bool,
}

impl ExtractArgs {
    fn range(&self) -> Result<CycleRange, String> {
        match (self.start, self.end) {
            (None, None) => Ok(CycleRange::TrailingDay),
            (start, end) => {
                let start = start.or(end).ok_or("Missing start date")?;
                let end = end.unwrap_or(start);
                if end < start {
                    return Err(format!("--end {end} precedes --start {start}"));
                }
                Ok(CycleRange::Fixed { start, end })
            }
        }
    }

    /// Execute the extract command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting extract command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "Configuration validation failed");
            eprintln!("Configuration validation failed: {e}");
            return Ok(2);
        }

        let entities = match parse_entities(self.entity.as_deref(), EntityKind::ALL.to_vec()) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Invalid --entity: {e}");
                return Ok(2);
            }
        };
        let range = match self.range() {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Invalid date range: {e}");
                return Ok(2);
            }
        };

        if config.application.dry_run {
            println!("🔍 DRY RUN MODE - No data will be written to the database");
            println!();
        }

        let stores = match create_stores(&config.postgresql).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                eprintln!("Failed to connect to database: {e}");
                return Ok(4);
            }
        };

        let registry = match ExtractorRegistry::from_config(
            &config,
            stores.records.clone(),
            shutdown_signal.clone(),
        ) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Failed to initialize API client: {e}");
                return Ok(2);
            }
        };
        let mut runner =
            ExtractionRunner::new(stores.log.clone(), InvalidTolerance::from(&config.tolerance));
        if !config.application.dry_run {
            runner = runner.with_page_audit(stores.pages.clone());
        }

        let mut cycle = ExtractionCycle::new(
            Arc::new(registry),
            Arc::new(runner),
            entities,
            shutdown_signal.clone(),
        )
        .loop_mode(self.loop_mode);
        if !self.skip_audit {
            cycle = cycle.with_audit(Arc::new(AuditEngine::new(
                stores.audit.clone(),
                stores.log.clone(),
                &config.audit,
            )));
        }
        if self.loop_mode && config.reconciliation.enabled && !config.application.dry_run {
            cycle = cycle.with_reconciler(Arc::new(LoopReconciler::new(
                stores.reconciliation.clone(),
                &config.reconciliation,
            )));
        }

        println!("🚀 Extracting {} entities...", cycle.entities().len());
        println!();

        if !self.loop_mode {
            return match cycle.run_once(range).await {
                Ok(summary) => {
                    print_summary(&summary);
                    Ok(summary.exit_code())
                }
                Err(e) => {
                    tracing::error!(error = %e, "Extraction cycle failed");
                    eprintln!("Extraction failed: {e}");
                    Ok(5)
                }
            };
        }

        let mut shutdown = shutdown_signal;
        let interval = Duration::from_secs(self.interval_secs);
        let mut cycles: u64 = 0;
        loop {
            cycles += 1;
            tracing::info!(cycle = cycles, "Starting extraction cycle");
            let summary = match cycle.run_once(range).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "Extraction cycle failed");
                    eprintln!("Extraction failed: {e}");
                    return Ok(5);
                }
            };
            print_summary(&summary);

            if summary.interrupted || *shutdown.borrow() {
                println!("⚠️  Loop stopped after {cycles} cycle(s).");
                return Ok(130);
            }

            tracing::info!(next_in_secs = self.interval_secs, "Waiting for next cycle");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    // Sender gone: no signal can arrive any more, keep the cadence
                    if changed.is_err() {
                        tokio::time::sleep(interval).await;
                    }
                }
            }

            if *shutdown.borrow() {
                println!("⚠️  Loop stopped after {cycles} cycle(s).");
                return Ok(130);
            }
        }
    }
}

fn print_summary(summary: &CycleSummary) {
    println!();
    println!("📊 Extraction Summary:");
    println!(
        "  {:<18} {:<18} {:<26} {:>9} {:>9} {:>9} {:>8} {:>6}",
        "Entity", "Status", "Reason", "Received", "Unique", "Persisted", "Invalid", "Pages"
    );
    println!("  {}", "-".repeat(112));
    for report in &summary.reports {
        println!(
            "  {:<18} {:<18} {:<26} {:>9} {:>9} {:>9} {:>8} {:>6}",
            report.entity.as_str(),
            report.status.storage_code(),
            report.reason.as_str(),
            report.counters.received,
            report.counters.unique,
            report.counters.persisted,
            report.counters.invalid,
            report.counters.pages
        );
    }
    for error in &summary.errors {
        println!("  {:<18} ❌ {}", error.entity.as_str(), error.message);
    }
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());

    if let Some(reconciliation) = &summary.reconciliation {
        println!();
        if !reconciliation.reconciled.is_empty() {
            let days: Vec<String> = reconciliation.reconciled.iter().map(|d| d.to_string()).collect();
            println!("🔁 Reconciled: {}", days.join(", "));
        }
        for failure in &reconciliation.failures {
            println!("  ❌ {failure}");
        }
        if !reconciliation.remaining.is_empty() {
            let days: Vec<String> = reconciliation.remaining.iter().map(|d| d.to_string()).collect();
            println!("⏳ Pending reconciliation: {}", days.join(", "));
        }
    }

    if let Some(audit) = &summary.audit {
        println!();
        if audit.valid {
            println!("✅ Integrity audit passed");
        } else {
            println!("❌ Integrity audit found {} failure(s):", audit.failures.len());
            for failure in &audit.failures {
                println!("  - {failure}");
            }
        }
    }

    println!();
    if summary.interrupted {
        println!("⚠️  Extraction interrupted. Completed runs are logged.");
    } else if summary.is_successful() {
        println!("✅ Extraction completed successfully!");
    } else {
        println!("⚠️  Extraction completed with incomplete runs or audit failures");
    }
}
