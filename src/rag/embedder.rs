use std::sync::Arc;

use crate::core::errors::PipelineError;
use crate::llm::LlmProvider;

/// Turns a search query into the dense vector used for retrieval.
pub struct Embedder {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl Embedder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn embed(&self, query: &str) -> Result<Vec<f32>, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::InvalidInput(
                "cannot embed an empty query".to_string(),
            ));
        }

        let vectors = self
            .provider
            .embed(&[query.to_string()], &self.model)
            .await
            .map_err(|e| PipelineError::EmbeddingUnavailable(e.to_string()))?;

        match vectors.into_iter().next() {
            Some(vector) if !vector.is_empty() => Ok(vector),
            _ => Err(PipelineError::EmbeddingUnavailable(
                "empty embedding response".to_string(),
            )),
        }
    }
}
