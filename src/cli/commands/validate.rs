//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Tally configuration file.

use crate::config::{load_config, redact_connection_string};
use clap::Args;
use secrecy::ExposeSecret;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates every section
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  API: {}", config.api.base_url);
        println!(
            "  Request spacing: {} ms (max {} retries)",
            config.api.rate_limit.min_interval_ms, config.api.rate_limit.max_retries
        );
        println!(
            "  PostgreSQL: {}",
            redact_connection_string(config.postgresql.connection_string.expose_secret().as_ref())
        );
        println!("  Max Connections: {}", config.postgresql.max_connections);
        println!(
            "  Pagination: {} pages / {} records (page size {})",
            config.pagination.max_pages, config.pagination.max_records, config.pagination.page_size
        );
        println!(
            "  Enrichment: {} workers, queue {}",
            config.enrichment.workers, config.enrichment.queue_capacity
        );
        println!(
            "  Invalid tolerance: {} records / {:.2}%",
            config.tolerance.max_invalid_records, config.tolerance.max_invalid_percent
        );
        println!(
            "  Orphan tolerance: {} rows / {:.2}%",
            config.audit.max_orphans, config.audit.max_orphan_percent
        );
        println!(
            "  Audited entities: {}",
            config
                .audit
                .default_entities()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let code = ValidateArgs {}
            .execute("/nonexistent/tally.toml")
            .await
            .unwrap();
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn test_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "https://ops.example.com"
token = "t"

[postgresql]
connection_string = "postgresql://user:pw@localhost/tally"
"#
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 0);
    }
}
