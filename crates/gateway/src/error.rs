//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use studiobot_core::error::KnowledgeError;
use studiobot_memory::ProjectPathError;
use studiobot_security::PathValidationError;
use tracing::error;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A failed request: status code plus a message returned as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<PathValidationError> for ApiError {
    fn from(e: PathValidationError) -> Self {
        match e {
            PathValidationError::CanonicalizeFailed { .. } => Self::internal(e.to_string()),
            _ => Self::bad_request(e.to_string()),
        }
    }
}

impl From<ProjectPathError> for ApiError {
    fn from(e: ProjectPathError) -> Self {
        match e {
            ProjectPathError::InvalidKey(inner) => inner.into(),
            ProjectPathError::NotConfigured(_) => Self::not_found(e.to_string()),
            ProjectPathError::EmptyPath => Self::bad_request(e.to_string()),
            ProjectPathError::Storage(_) => Self::internal(e.to_string()),
        }
    }
}

impl From<KnowledgeError> for ApiError {
    fn from(e: KnowledgeError) -> Self {
        match e {
            KnowledgeError::InvalidInput(_) => Self::bad_request(e.to_string()),
            KnowledgeError::EmbeddingFailed(_) => Self::new(StatusCode::BAD_GATEWAY, e.to_string()),
            KnowledgeError::Storage(_) => Self::internal(e.to_string()),
        }
    }
}
