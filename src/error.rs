//! Error types for Grantflow
//!
//! This module defines all error types used throughout the service,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Grantflow operations
///
/// This enum encompasses all possible errors that can occur during
/// session handling, answer interpretation, candidate filtering,
/// scoring, and persistence.
///
/// AI-dependent failures (`Interpretation`, `Scoring`) are recovered
/// locally at their call sites and never surface as request errors;
/// only `Storage` failures abort a request.
#[derive(Error, Debug)]
pub enum GrantflowError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session lookup failed (maps to HTTP 404)
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Question code is unknown or not visible to the session (maps to HTTP 400)
    #[error("Invalid question id: {0}")]
    InvalidQuestionId(String),

    /// Feedback targeted a recommendation that is not in the session's
    /// batch (maps to HTTP 404)
    #[error("Recommendation not found for grant: {0}")]
    RecommendationNotFound(String),

    /// Malformed request payload (maps to HTTP 400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// External AI interpretation failed; recovered via literal-text fallback
    #[error("Interpretation unavailable: {0}")]
    Interpretation(String),

    /// External AI scoring failed; recovered via neutral fallback ranking
    #[error("Scoring unavailable: {0}")]
    Scoring(String),

    /// AI provider transport errors (API calls, malformed responses)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Durable-state read/write errors (maps to HTTP 5xx)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Grantflow operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = GrantflowError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_session_not_found_display() {
        let error = GrantflowError::SessionNotFound("abc-123".to_string());
        assert_eq!(error.to_string(), "Session not found: abc-123");
    }

    #[test]
    fn test_invalid_question_id_display() {
        let error = GrantflowError::InvalidQuestionId("bogus".to_string());
        assert_eq!(error.to_string(), "Invalid question id: bogus");
    }

    #[test]
    fn test_validation_error_display() {
        let error = GrantflowError::Validation("missing value".to_string());
        assert_eq!(error.to_string(), "Validation error: missing value");
    }

    #[test]
    fn test_interpretation_error_display() {
        let error = GrantflowError::Interpretation("timeout".to_string());
        assert_eq!(error.to_string(), "Interpretation unavailable: timeout");
    }

    #[test]
    fn test_scoring_error_display() {
        let error = GrantflowError::Scoring("API 500".to_string());
        assert_eq!(error.to_string(), "Scoring unavailable: API 500");
    }

    #[test]
    fn test_storage_error_display() {
        let error = GrantflowError::Storage("database connection failed".to_string());
        assert_eq!(
            error.to_string(),
            "Storage error: database connection failed"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: GrantflowError = io_error.into();
        assert!(matches!(error, GrantflowError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_str = "{invalid json}";
        let json_error = serde_json::from_str::<serde_json::Value>(json_str).unwrap_err();
        let error: GrantflowError = json_error.into();
        assert!(matches!(error, GrantflowError::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GrantflowError>();
    }
}
