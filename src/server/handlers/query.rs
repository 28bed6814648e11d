use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::utils::parse_json_body;
use crate::core::errors::ApiError;
use crate::rag::ContextBundle;
use crate::server::sse::sanitize_bundle;
use crate::state::AppState;

const MAX_TOP_K: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryBody {
    #[serde(default)]
    pub query: String,
    pub top_k: Option<usize>,
    pub score_threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub chunks: ContextBundle,
    pub total_results: usize,
}

impl QueryBody {
    fn validate(&self) -> Result<(), ApiError> {
        if self.query.trim().is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".to_string()));
        }
        if let Some(top_k) = self.top_k {
            if !(1..=MAX_TOP_K).contains(&top_k) {
                return Err(ApiError::BadRequest(format!(
                    "topK must be between 1 and {}",
                    MAX_TOP_K
                )));
            }
        }
        if let Some(threshold) = self.score_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ApiError::BadRequest(
                    "scoreThreshold must be between 0 and 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// `POST /api/query`: retrieval only, no rewriting and no generation.
pub async fn query(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<QueryResponse>, ApiError> {
    let body: QueryBody = parse_json_body(&body)?;
    body.validate()?;

    let pipeline = state.pipeline()?;
    let query = body.query.trim().to_string();
    let top_k = body.top_k.unwrap_or_else(|| pipeline.default_top_k());

    let mut bundle = pipeline.search(&query, top_k).await?;
    bundle.retain_min_similarity(body.score_threshold.unwrap_or(0.0));
    let chunks = sanitize_bundle(&bundle);

    tracing::info!(query = %query, top_k, results = chunks.total_chunks(), "direct query served");

    Ok(Json(QueryResponse {
        total_results: chunks.total_chunks(),
        query,
        chunks,
    }))
}
