//! Error types for the studiobot domain.
//!
//! Each bounded context has its own `thiserror` enum.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Tool failures. The display text is what the model and the client see.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error("{reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool panicked: {0}")]
    Panicked(String),
}

impl ToolError {
    pub fn failed(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }
}
