//! Status command implementation
//!
//! Shows the most recent extraction log rows.

use crate::adapters::database::create_stores;
use crate::config::load_config;
use crate::core::audit::summarize_message;
use crate::domain::EntityKind;
use clap::Args;
use std::str::FromStr;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter by entity
    #[arg(long)]
    pub entity: Option<String>,

    /// Number of rows to show
    #[arg(long, default_value_t = 20)]
    pub limit: i64,

    /// Include the log message of each run
    #[arg(long)]
    pub verbose: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking extraction status");

        println!("📊 Extraction Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let entity = match self.entity.as_deref().map(EntityKind::from_str).transpose() {
            Ok(e) => e,
            Err(e) => {
                println!("❌ {e}");
                return Ok(2);
            }
        };

        let stores = match create_stores(&config.postgresql).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        let rows = match stores.log.recent(entity, self.limit.max(1)).await {
            Ok(r) => r,
            Err(e) => {
                println!("❌ Failed to read the extraction log");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if rows.is_empty() {
            println!("No extraction history found.");
            println!("Run 'tally extract' to start extracting data.");
            return Ok(0);
        }

        println!("Found {} run(s):", rows.len());
        println!();
        println!(
            "{:<8} {:<18} {:<18} {:<26} {:>10} {:>6} {:<25}",
            "Id", "Entity", "Status", "Reason", "Records", "Pages", "Finished"
        );
        println!("{}", "-".repeat(116));

        for row in rows {
            let status = if row.status.is_complete() {
                format!("✅ {}", row.status.storage_code())
            } else {
                format!("❌ {}", row.status.storage_code())
            };
            println!(
                "{:<8} {:<18} {:<18} {:<26} {:>10} {:>6} {:<25}",
                row.id.map(|id| id.to_string()).unwrap_or_default(),
                row.entity.as_str(),
                status,
                row.reason_code,
                row.records_extracted,
                row.pages_processed,
                row.window_end.format("%Y-%m-%d %H:%M:%S")
            );
            if self.verbose {
                println!("         {}", summarize_message(&row.message));
            }
        }

        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_args_defaults() {
        let args = StatusArgs {
            entity: None,
            limit: 20,
            verbose: false,
        };

        assert!(args.entity.is_none());
        assert_eq!(args.limit, 20);
    }
}
