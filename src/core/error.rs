//! Custom error types for Conclave
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for Conclave operations
#[derive(Error, Debug)]
pub enum ConclaveError {
    /// Malformed construction: unknown role, duplicate or unknown tool
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool callable failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Model backend failure (connectivity, quota, bad response)
    #[error("Model backend error: {0}")]
    ModelBackend(String),

    /// A model or tool call exceeded its deadline
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A leader addressed a worker that cannot be resolved
    #[error("Delegation error: {0}")]
    Delegation(String),

    /// The caller cancelled the run
    #[error("Run cancelled")]
    Cancelled,

    /// Model not available on the backend
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Conclave operations
pub type Result<T> = std::result::Result<T, ConclaveError>;

impl ConclaveError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a model backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::ModelBackend(msg.into())
    }

    /// Create a delegation error
    pub fn delegation(msg: impl Into<String>) -> Self {
        Self::Delegation(msg.into())
    }

    /// Whether a model call failing with this error is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ModelBackend(_) | Self::Timeout(_) | Self::Http(_) | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        assert!(ConclaveError::backend("quota").is_transient());
        assert!(ConclaveError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ConclaveError::config("unknown role").is_transient());
        assert!(!ConclaveError::ModelNotFound("x".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = ConclaveError::delegation("unknown worker 'Ghost'");
        assert_eq!(err.to_string(), "Delegation error: unknown worker 'Ghost'");
    }
}
