//! Vector index access.
//!
//! The retriever only depends on [`VectorIndex`]; the Pinecone-compatible
//! HTTP client is the production implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::types::RawMatch;
use crate::core::errors::ApiError;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest-neighbour search; matches come back in relevance order.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RawMatch>, ApiError>;
}

const PINECONE_API_VERSION: &str = "2024-07";

/// One Pinecone index, addressed by its data-plane host.
#[derive(Clone)]
pub struct PineconeIndex {
    host: String,
    api_key: String,
    namespace: Option<String>,
    client: Client,
}

impl PineconeIndex {
    pub fn new(client: Client, host: &str, api_key: &str, namespace: Option<String>) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        Self {
            host,
            api_key: api_key.to_string(),
            namespace,
            client,
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RawMatch>, ApiError> {
        let url = format!("{}/query", self.host);

        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let (Some(namespace), Some(obj)) = (&self.namespace, body.as_object_mut()) {
            obj.insert("namespace".to_string(), json!(namespace));
        }

        let response = self
            .client
            .post(url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "vector query failed: {}",
                response.status()
            )));
        }

        let payload: QueryResponse = response.json().await.map_err(ApiError::upstream)?;
        Ok(payload.matches)
    }
}
