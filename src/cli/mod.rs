//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Tally using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Tally - Extraction, Reconciliation and Audit ETL Tool
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(version, about, long_about = None)]
#[command(author = "Tally Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tally.toml", env = "TALLY_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TALLY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract entities into PostgreSQL, log every run and audit the cycle
    Extract(commands::extract::ExtractArgs),

    /// Audit an execution window against the extraction log
    Audit(commands::audit::AuditArgs),

    /// Show recent extraction log rows
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_extract() {
        let cli = Cli::parse_from(["tally", "extract"]);
        assert_eq!(cli.config, "tally.toml");
        assert!(matches!(cli.command, Commands::Extract(_)));
    }

    #[test]
    fn test_cli_parse_extract_loop() {
        let cli = Cli::parse_from([
            "tally",
            "extract",
            "--entity",
            "freights,invoices",
            "--loop",
            "--interval-secs",
            "600",
        ]);
        let Commands::Extract(args) = cli.command else {
            panic!("expected extract command");
        };
        assert!(args.loop_mode);
        assert_eq!(args.interval_secs, 600);
        assert_eq!(args.entity.as_deref(), Some("freights,invoices"));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["tally", "--config", "custom.toml", "status"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["tally", "--log-level", "debug", "audit"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["tally", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["tally", "status", "--entity", "pickups", "--limit", "5"]);
        let Commands::Status(args) = cli.command else {
            panic!("expected status command");
        };
        assert_eq!(args.limit, 5);
    }
}
