//! Common error types used across all Pulse crates
//! Provides consistent error handling and reporting

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base error type for all request and chart operations
///
/// The type is `Clone` because one failure is delivered to every caller that
/// joined the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum PulseError {
    // Request errors
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Submission still rejected by cooldown after {attempts} attempts")]
    CooldownViolation { attempts: u32 },

    #[error("Job submission failed: {message}")]
    SubmissionFailed { message: String },

    #[error("Job {job_id} did not complete within {duration_ms}ms")]
    Timeout { job_id: String, duration_ms: u64 },

    #[error("Job {job_id} failed: {payload}")]
    JobFailed {
        job_id: String,
        payload: serde_json::Value,
    },

    // Data errors
    #[error("Data parse error: {message}")]
    DataParse { message: String },

    // Network errors
    #[error("Network request failed: {message}")]
    Network { message: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
        field: Option<String>,
    },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PulseError {
    /// True for failures the backend reported about the job itself
    pub fn is_job_failure(&self) -> bool {
        matches!(self, PulseError::JobFailed { .. })
    }
}

/// Result type alias for Pulse operations
pub type PulseResult<T> = Result<T, PulseError>;

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::DataParse {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = PulseError::JobFailed {
            job_id: "42".to_string(),
            payload: serde_json::json!("bot error"),
        };
        assert!(error.is_job_failure());

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "JobFailed");
        assert_eq!(json["details"]["payload"], "bot error");

        let back: PulseError = serde_json::from_value(json).unwrap();
        assert_eq!(back, error);
    }

    #[test]
    fn test_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: PulseError = parse_err.into();

        match err {
            PulseError::DataParse { message } => assert!(!message.is_empty()),
            _ => panic!("Wrong error variant"),
        }
    }

    #[test]
    fn test_display() {
        let err = PulseError::Timeout {
            job_id: "abc".to_string(),
            duration_ms: 80_000,
        };
        assert_eq!(err.to_string(), "Job abc did not complete within 80000ms");
        assert!(!err.is_job_failure());
    }
}
