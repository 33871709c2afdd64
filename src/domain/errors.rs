//! Domain error types
//!
//! This module defines the error hierarchy for Tally.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Tally error type
///
/// This is the primary error type used throughout the application.
/// Run-level outcomes such as incomplete pagination are *not* errors; they travel
/// as structured results. Only irrecoverable conditions end up here.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote API errors surfaced after the request channel gave up
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// Extraction process errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Systemic failures of the enrichment pipeline
    #[error("Enrichment error: {0}")]
    Enrichment(String),

    /// Audit engine errors (not findings; findings are data)
    #[error("Audit error: {0}")]
    Audit(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// The operation was interrupted by a shutdown signal
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Remote API errors
///
/// Produced by the HTTP adapter and classified so the request channel can decide
/// whether a call is worth retrying.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failed to connect to the remote API
    #[error("Failed to connect to API: {0}")]
    ConnectionFailed(String),

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Throttled by the remote side (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than 429)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The channel breaker is open and refuses calls
    #[error("Circuit breaker open for {label}, retry in {retry_in_secs}s")]
    CircuitOpen { label: String, retry_in_secs: u64 },

    /// All attempts failed
    #[error("Retries exhausted for {label} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        label: String,
        attempts: usize,
        last_error: String,
    },
}

impl ApiError {
    /// Whether the request channel should try this call again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::ConnectionFailed(_)
                | ApiError::Timeout(_)
                | ApiError::RateLimited(_)
                | ApiError::ServerError { .. }
        )
    }

    /// Whether the failure counts against the channel breaker
    pub fn counts_as_failure(&self) -> bool {
        self.is_retryable()
    }

    /// Classify an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate_body(body);
        match status {
            429 => ApiError::RateLimited(message),
            500..=599 => ApiError::ServerError { status, message },
            _ => ApiError::ClientError { status, message },
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for TallyError {
    fn from(err: std::io::Error) -> Self {
        TallyError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for TallyError {
    fn from(err: toml::de::Error) -> Self {
        TallyError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<tokio_postgres::Error> for TallyError {
    fn from(err: tokio_postgres::Error) -> Self {
        TallyError::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for TallyError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        TallyError::Database(format!("Failed to get connection from pool: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_error_display() {
        let err = TallyError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_api_error_conversion() {
        let api_err = ApiError::ConnectionFailed("Network error".to_string());
        let err: TallyError = api_err.into();
        assert!(matches!(err, TallyError::Api(_)));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ApiError::from_status(429, "slow down"),
            ApiError::RateLimited(_)
        ));
        assert!(matches!(
            ApiError::from_status(503, ""),
            ApiError::ServerError { status: 503, .. }
        ));
        assert!(matches!(
            ApiError::from_status(404, "missing"),
            ApiError::ClientError { status: 404, .. }
        ));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ApiError::Timeout("t".into()).is_retryable());
        assert!(ApiError::RateLimited("r".into()).is_retryable());
        assert!(ApiError::ServerError {
            status: 502,
            message: String::new()
        }
        .is_retryable());
        assert!(!ApiError::ClientError {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!ApiError::InvalidResponse("bad".into()).is_retryable());
    }

    #[test]
    fn test_body_is_truncated() {
        let body = "x".repeat(500);
        match ApiError::from_status(500, &body) {
            ApiError::ServerError { message, .. } => {
                assert!(message.ends_with("..."));
                assert_eq!(message.len(), 203);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: TallyError = io_err.into();
        assert!(matches!(err, TallyError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: TallyError = json_err.into();
        assert!(matches!(err, TallyError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: TallyError = toml_err.into();
        assert!(matches!(err, TallyError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
