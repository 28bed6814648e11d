use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::rag::types::SourceName;

/// Failure modes of a single chat request.
///
/// Only the variants that occur before the event stream is opened are ever
/// turned into an HTTP response; the rest are recovered locally or reported
/// on the open stream.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("retrieval from {source_name} failed: {message}")]
    RetrievalSourceUnavailable {
        source_name: SourceName,
        message: String,
    },
    #[error("query rewrite failed: {0}")]
    RewriteFailed(String),
    #[error("generation stream error: {0}")]
    GenerationStream(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn upstream<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Upstream(err.to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "INVALID_INPUT",
            ApiError::Configuration(_) => "CONFIGURATION_ERROR",
            ApiError::EmbeddingUnavailable(_) => "EMBEDDING_UNAVAILABLE",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            PipelineError::Configuration(msg) => ApiError::Configuration(msg),
            PipelineError::EmbeddingUnavailable(msg) => ApiError::EmbeddingUnavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Configuration(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            ApiError::EmbeddingUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message, "code": self.code() }));
        (status, body).into_response()
    }
}
