//! Typed errors for the job pipeline.
//!
//! Uses `thiserror` for library errors. Every error maps onto an
//! [`ErrorKind`] so the orchestrator can decide between "count it and move
//! on", "fail the company unit and try again on the next run" and "fatal"
//! without matching on individual variants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Stage;

/// Boxed source error from a collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How an error should be treated by the stage flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad data for a single item. Never retried.
    ValidationFailed,
    /// Transient network, LLM or datastore failure. A later run should succeed.
    Retryable,
    /// Anything else: bad configuration or an unexpected failure.
    Fatal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed AI response, missing required field or bad company data
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Web extraction failed (timeout, transport, empty page)
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: BoxError,
    },

    /// AI extraction failed (timeout, rate limit, transport)
    #[error("AI extraction failed for {context}: {source}")]
    Ai {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Persistence operation failed
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),

    /// Configuration is unusable
    #[error("config error: {0}")]
    Config(String),

    /// Run inputs rejected before any stage started
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Anything the pipeline did not anticipate, with company/stage context
    #[error("unexpected error for {company} at {stage}: {message}")]
    Unexpected {
        company: String,
        stage: Stage,
        message: String,
    },
}

impl PipelineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Fetch {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn ai(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Ai {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn storage(source: impl Into<BoxError>) -> Self {
        Self::Storage(source.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation { .. } => ErrorKind::ValidationFailed,
            PipelineError::Fetch { .. } | PipelineError::Ai { .. } | PipelineError::Storage(_) => {
                ErrorKind::Retryable
            }
            PipelineError::Config(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::Unexpected { .. } => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::validation(format!("JSON error: {}", err))
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            PipelineError::validation("missing title").kind(),
            ErrorKind::ValidationFailed
        );
        assert_eq!(
            PipelineError::fetch("https://acme.test", "timeout").kind(),
            ErrorKind::Retryable
        );
        assert_eq!(PipelineError::ai("Acme", "rate limited").kind(), ErrorKind::Retryable);
        assert_eq!(PipelineError::storage("connection reset").kind(), ErrorKind::Retryable);
        assert_eq!(
            PipelineError::Unexpected {
                company: "Acme".into(),
                stage: Stage::Details,
                message: "task panicked".into(),
            }
            .kind(),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_json_errors_are_validation_failures() {
        let err: PipelineError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }
}
