//! Configuration management for Tally.
//!
//! Tally reads a TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - Default values for every optional setting
//! - `TALLY_<SECTION>_<KEY>` environment overrides
//! - Validation on load
//!
//! # Example Configuration
//!
//! ```toml
//! environment = "production"
//!
//! [application]
//! log_level = "info"
//!
//! [api]
//! base_url = "https://ops.example.com"
//! token = "${TALLY_API_TOKEN}"
//!
//! [api.rate_limit]
//! min_interval_ms = 2200
//!
//! [enrichment]
//! workers = 4
//!
//! [postgresql]
//! connection_string = "${TALLY_DATABASE_URL}"
//! ```
//!
//! ```rust,no_run
//! use tally::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("tally.toml")?;
//! println!("API: {}", config.api.base_url);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config};
pub use schema::{
    ApiConfig, ApplicationConfig, AuditConfig, EnrichmentConfig, Environment, LoggingConfig,
    PaginationConfig, PostgreSQLConfig, RateLimitConfig, ReconciliationConfig, TallyConfig,
    ToleranceConfig,
};
pub use secret::{redact_connection_string, secret_string, SecretString, SecretValue};
