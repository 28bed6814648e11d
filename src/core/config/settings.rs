//! Typed views over the merged config document.
//!
//! `PipelineSettings` is resolved per request so that a missing credential
//! fails the request before any network call. `ServerSettings` is resolved
//! once at startup and never fails.

use std::time::Duration;

use serde_json::Value;

use crate::core::errors::PipelineError;
use crate::rag::types::SourceName;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CITY: &str = "San Francisco";
pub const DEFAULT_TOP_K: usize = 20;
const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_LLM_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_REWRITE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub rewrite_model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub request_timeout: Duration,
    /// Bound on the best-effort query rewrite call.
    pub rewrite_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub name: SourceName,
    pub host: String,
    pub namespace: Option<String>,
    /// Bound applied to this source's search call only.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub api_key: String,
    pub top_k: usize,
    pub sources: Vec<SourceSettings>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub city: String,
}

impl PipelineSettings {
    pub fn from_config(config: &Value) -> Result<Self, PipelineError> {
        let llm = LlmSettings {
            base_url: string_at(config, &["llm", "base_url"])
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: required_string(config, &["llm", "api_key"])?,
            chat_model: string_at(config, &["llm", "chat_model"])
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            rewrite_model: string_at(config, &["llm", "rewrite_model"])
                .or_else(|| string_at(config, &["llm", "chat_model"]))
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: string_at(config, &["llm", "embedding_model"])
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            temperature: value_at(config, &["llm", "temperature"])
                .and_then(Value::as_f64)
                .unwrap_or(0.7),
            max_tokens: value_at(config, &["llm", "max_tokens"])
                .and_then(Value::as_u64)
                .map(|v| v as u32)
                .unwrap_or(1000),
            top_p: value_at(config, &["llm", "top_p"])
                .and_then(Value::as_f64)
                .unwrap_or(1.0),
            request_timeout: Duration::from_millis(
                value_at(config, &["llm", "request_timeout_ms"])
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_LLM_TIMEOUT_MS),
            ),
            rewrite_timeout: Duration::from_millis(
                value_at(config, &["llm", "rewrite_timeout_ms"])
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_REWRITE_TIMEOUT_MS),
            ),
        };

        let default_timeout = value_at(config, &["retrieval", "timeout_ms"])
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_SOURCE_TIMEOUT_MS);

        let mut sources = Vec::with_capacity(SourceName::ALL.len());
        for name in SourceName::ALL {
            let base = ["retrieval", "sources", name.as_str()];
            let host = required_string(config, &[base[0], base[1], base[2], "host"])?;
            let namespace = string_at(config, &[base[0], base[1], base[2], "namespace"]);
            let timeout_ms = value_at(config, &[base[0], base[1], base[2], "timeout_ms"])
                .and_then(Value::as_u64)
                .unwrap_or(default_timeout);
            sources.push(SourceSettings {
                name,
                host,
                namespace,
                timeout: Duration::from_millis(timeout_ms),
            });
        }

        let retrieval = RetrievalSettings {
            api_key: required_string(config, &["retrieval", "api_key"])?,
            top_k: value_at(config, &["retrieval", "top_k"])
                .and_then(Value::as_u64)
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_TOP_K),
            sources,
        };

        Ok(PipelineSettings {
            llm,
            retrieval,
            city: string_at(config, &["assistant", "city"])
                .unwrap_or_else(|| DEFAULT_CITY.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Zero disables rate limiting.
    pub rate_limit_per_minute: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: vec!["*".to_string()],
            rate_limit_per_minute: 60,
        }
    }
}

impl ServerSettings {
    pub fn from_config(config: &Value) -> Self {
        let defaults = Self::default();
        Self {
            host: string_at(config, &["server", "host"]).unwrap_or(defaults.host),
            port: value_at(config, &["server", "port"])
                .and_then(Value::as_u64)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(defaults.port),
            cors_allowed_origins: value_at(config, &["server", "cors_allowed_origins"])
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or(defaults.cors_allowed_origins),
            rate_limit_per_minute: value_at(config, &["server", "rate_limit_per_minute"])
                .and_then(Value::as_u64)
                .map(|v| v.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.rate_limit_per_minute),
        }
    }
}

fn value_at<'a>(config: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(config, |current, key| current.get(*key))
        .filter(|v| !v.is_null())
}

fn string_at(config: &Value, path: &[&str]) -> Option<String> {
    value_at(config, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_string(config: &Value, path: &[&str]) -> Result<String, PipelineError> {
    string_at(config, path).ok_or_else(|| {
        PipelineError::Configuration(format!("missing required setting '{}'", path.join(".")))
    })
}
