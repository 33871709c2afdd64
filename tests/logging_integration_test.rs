//! Integration tests for logging functionality

use tally::config::LoggingConfig;
use tally::core::audit::{AuditFinding, Severity};
use tally::domain::EntityKind;
use tally::logging::init_logging;
use tally::{log_audit_finding, log_extraction_start, log_retry_attempt};
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert_eq!(config.local_path, "/var/log/tally");
}

// Installs the global subscriber, so it is the only test here that does
#[test]
fn test_init_creates_log_directory() {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "never".to_string(),
        local_max_size_mb: 10,
    };
    assert!(!log_path.exists());

    let guard = init_logging("debug", &config).unwrap();
    assert!(log_path.is_dir());

    // A second subscriber cannot be installed in the same process
    assert!(init_logging("info", &config).is_err());
    drop(guard);
}

#[test]
fn test_invalid_level_is_rejected() {
    let config = LoggingConfig {
        local_enabled: false,
        ..LoggingConfig::default()
    };
    let err = init_logging("verbose", &config).err().unwrap();
    assert!(err.to_string().contains("Invalid log level"));
}

#[test]
fn test_logging_macros_usage() {
    // Without a subscriber these are no-ops; they must still expand
    log_extraction_start!(EntityKind::Invoices, "2025-01-01", "2025-01-02");
    log_retry_attempt!("invoices page 3", 2, 5, 4000u64, "Server error: 503");

    let finding = AuditFinding::new("freights", "CONTAGEM_OK", Severity::Ok, "origem=1, destino=1");
    log_audit_finding!(finding);
    assert!(finding.log_line().starts_with("INTEGRIDADE_ETL | resultado=OK"));
}
