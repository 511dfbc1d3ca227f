//! Error types for Postrank
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// All error types that can occur in Postrank
#[derive(Debug, Error)]
pub enum PostrankError {
    /// Background job not found in storage
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job params failed validation
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// LLM API error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Model output could not be parsed even after repair attempts
    #[error("Parse error after {attempts} attempt(s): {message}")]
    Parse { attempts: u32, message: String },

    /// Delegated external command failed
    #[error("External command error: {0}")]
    External(String),

    /// Delegated external command exceeded its wall-clock limit
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PostrankError {
    /// Errors that will fail the same way on every retry
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PostrankError::Config(_) | PostrankError::InvalidParams(_)
        )
    }
}

/// Result type alias for Postrank operations
pub type Result<T> = std::result::Result<T, PostrankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_not_found_error() {
        let err = PostrankError::JobNotFound("job-1".to_string());
        assert_eq!(err.to_string(), "Job not found: job-1");
    }

    #[test]
    fn test_parse_error_display() {
        let err = PostrankError::Parse {
            attempts: 3,
            message: "expected value at line 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Parse error after 3 attempt(s): expected value at line 1"
        );
    }

    #[test]
    fn test_permanent_classification() {
        assert!(PostrankError::Config("missing".to_string()).is_permanent());
        assert!(PostrankError::InvalidParams("no dimension".to_string()).is_permanent());
        assert!(!PostrankError::Storage("locked".to_string()).is_permanent());
        assert!(!PostrankError::Timeout(Duration::from_secs(1)).is_permanent());
        assert!(
            !PostrankError::Parse {
                attempts: 3,
                message: "bad".to_string()
            }
            .is_permanent()
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PostrankError = io_err.into();
        assert!(matches!(err, PostrankError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: PostrankError = json_err.into();
        assert!(matches!(err, PostrankError::Json(_)));
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: PostrankError = LlmError::InvalidResponse("empty".to_string()).into();
        assert!(matches!(err, PostrankError::Llm(_)));
        assert_eq!(err.to_string(), "LLM error: Invalid response: empty");
    }
}
