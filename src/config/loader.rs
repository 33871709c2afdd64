//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::TallyConfig;
use super::secret::secret_string;
use crate::domain::errors::TallyError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into TallyConfig
/// 4. Applies environment variable overrides (TALLY_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns `TallyError::Configuration` if the file is missing or unreadable, a
/// referenced variable is unset, parsing fails or validation fails.
///
/// # Examples
///
/// ```no_run
/// use tally::config::loader::load_config;
///
/// let config = load_config("tally.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TallyConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(TallyError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        TallyError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration text, applying the same substitution and
/// overrides as [`load_config`]
pub fn parse_config(contents: &str) -> Result<TallyConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: TallyConfig = toml::from_str(&contents)
        .map_err(|e| TallyError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        TallyError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched so documented placeholders don't have to be set.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| TallyError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(TallyError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Reads and parses an override variable, failing loudly on malformed values
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| TallyError::Configuration(format!("Invalid value for {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using TALLY_* prefix
///
/// Environment variables follow the pattern: TALLY_<SECTION>_<KEY>
/// For example: TALLY_API_BASE_URL, TALLY_ENRICHMENT_WORKERS
fn apply_env_overrides(config: &mut TallyConfig) -> Result<()> {
    // Application
    if let Ok(val) = std::env::var("TALLY_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parse("TALLY_APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }

    // API
    if let Ok(val) = std::env::var("TALLY_API_BASE_URL") {
        config.api.base_url = val;
    }
    if let Ok(val) = std::env::var("TALLY_API_TOKEN") {
        config.api.token = secret_string(val);
    }
    if let Some(val) = env_parse("TALLY_API_TIMEOUT_SECONDS")? {
        config.api.timeout_seconds = val;
    }
    if let Some(val) = env_parse("TALLY_API_TLS_VERIFY")? {
        config.api.tls_verify = val;
    }
    if let Some(val) = env_parse("TALLY_API_RATE_LIMIT_MIN_INTERVAL_MS")? {
        config.api.rate_limit.min_interval_ms = val;
    }
    if let Some(val) = env_parse("TALLY_API_RATE_LIMIT_MAX_RETRIES")? {
        config.api.rate_limit.max_retries = val;
    }

    // Pagination
    if let Some(val) = env_parse("TALLY_PAGINATION_MAX_PAGES")? {
        config.pagination.max_pages = val;
    }
    if let Some(val) = env_parse("TALLY_PAGINATION_MAX_RECORDS")? {
        config.pagination.max_records = val;
    }

    // Enrichment
    if let Some(val) = env_parse("TALLY_ENRICHMENT_WORKERS")? {
        config.enrichment.workers = val;
    }
    if let Some(val) = env_parse("TALLY_ENRICHMENT_QUEUE_CAPACITY")? {
        config.enrichment.queue_capacity = val;
    }

    // Tolerance
    if let Some(val) = env_parse("TALLY_TOLERANCE_MAX_INVALID_RECORDS")? {
        config.tolerance.max_invalid_records = val;
    }
    if let Some(val) = env_parse("TALLY_TOLERANCE_MAX_INVALID_PERCENT")? {
        config.tolerance.max_invalid_percent = val;
    }

    // Audit
    if let Some(val) = env_parse("TALLY_AUDIT_MAX_ORPHANS")? {
        config.audit.max_orphans = val;
    }
    if let Some(val) = env_parse("TALLY_AUDIT_MAX_ORPHAN_PERCENT")? {
        config.audit.max_orphan_percent = val;
    }

    // Reconciliation
    if let Some(val) = env_parse("TALLY_RECONCILIATION_ENABLED")? {
        config.reconciliation.enabled = val;
    }
    if let Some(val) = env_parse("TALLY_RECONCILIATION_MAX_PER_CYCLE")? {
        config.reconciliation.max_per_cycle = val;
    }

    // PostgreSQL
    if let Ok(val) = std::env::var("TALLY_POSTGRESQL_CONNECTION_STRING") {
        config.postgresql.connection_string = secret_string(val);
    }
    if let Some(val) = env_parse("TALLY_POSTGRESQL_MAX_CONNECTIONS")? {
        config.postgresql.max_connections = val;
    }
    if let Ok(val) = std::env::var("TALLY_POSTGRESQL_SSL_MODE") {
        config.postgresql.ssl_mode = val;
    }

    // Logging
    if let Some(val) = env_parse("TALLY_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("TALLY_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("TALLY_LOADER_TEST_VAR", "test_value");
        let input = "token = \"${TALLY_LOADER_TEST_VAR}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "token = \"test_value\"\n");
        std::env::remove_var("TALLY_LOADER_TEST_VAR");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        std::env::remove_var("TALLY_LOADER_MISSING_VAR");
        let input = "token = \"${TALLY_LOADER_MISSING_VAR}\"";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("TALLY_LOADER_MISSING_VAR"));
    }

    #[test]
    fn test_substitute_skips_comments() {
        std::env::remove_var("TALLY_LOADER_COMMENTED");
        let input = "# token = \"${TALLY_LOADER_COMMENTED}\"\nkey = 1";
        assert!(substitute_env_vars(input).is_ok());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_valid() {
        let toml_content = r#"
[api]
base_url = "https://api.example.com"
token = "secret"

[postgresql]
connection_string = "postgresql://tally:pw@localhost:5432/tally"

[audit]
entities = ["manifests", "pickups"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.pagination.page_size, 100);
        assert_eq!(config.audit.entities.len(), 2);
    }
}
