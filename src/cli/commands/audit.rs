//! Audit command implementation
//!
//! Re-validates a past execution window against the extraction log without
//! calling the remote API.

use super::parse_entities;
use crate::adapters::database::create_stores;
use crate::config::load_config;
use crate::core::audit::{AuditEngine, AuditReport, CompletenessValidator};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use std::time::Instant;

/// Arguments for the audit command
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Start of the execution window (RFC 3339, default 24h ago)
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// End of the execution window (RFC 3339, default now)
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,

    /// Entities to audit (comma-separated, default from config)
    #[arg(long)]
    pub entity: Option<String>,

    /// Treat the window as part of a continuous loop
    #[arg(long)]
    pub loop_mode: bool,

    /// Also compare each entity's latest complete run of the day with persisted rows
    #[arg(long)]
    pub completeness: bool,

    /// Day for --completeness (default: the day of --end)
    #[arg(long)]
    pub day: Option<NaiveDate>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl AuditArgs {
    /// Execute the audit command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        let entities = match parse_entities(self.entity.as_deref(), config.audit.default_entities()) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Invalid --entity: {e}");
                return Ok(2);
            }
        };

        let end = self.end.unwrap_or_else(Utc::now);
        let start = self.start.unwrap_or(end - Duration::hours(24));
        if end < start {
            eprintln!("--end {end} precedes --start {start}");
            return Ok(2);
        }

        let stores = match create_stores(&config.postgresql).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                eprintln!("Failed to connect to database: {e}");
                return Ok(4);
            }
        };

        let timer = Instant::now();
        let engine = AuditEngine::new(stores.audit.clone(), stores.log.clone(), &config.audit);
        let result = engine
            .validate_execution(start, end, &entities, self.loop_mode)
            .await;

        let mut report = AuditReport::new(start, end, entities.clone(), self.loop_mode, result);
        if self.completeness {
            let day = self.day.unwrap_or_else(|| end.date_naive());
            let validator = CompletenessValidator::new(stores.log.clone(), stores.audit.clone());
            report = report.with_completeness(validator.validate_by_logs(day, &entities).await);
        }
        report.set_duration(timer.elapsed().as_millis() as u64);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", report.format_summary());
        }

        Ok(if report.is_success() { 0 } else { 1 })
    }
}
