use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::core::errors::ApiError;

/// Parses a JSON request body so that malformed input gets the regular
/// JSON error response instead of the extractor's plain-text rejection.
pub fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body is empty".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
}
