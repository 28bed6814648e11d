use serde_json::{Map, Value};

use crate::core::errors::PipelineError;
use crate::rag::types::SourceName;

/// Type-checks the known sections of the config document.
///
/// Presence of credentials is not checked here; that happens when the
/// document is resolved into [`super::PipelineSettings`].
pub fn validate_config(config: &Value) -> Result<(), PipelineError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
        validate_u64_field(
            server,
            "server.rate_limit_per_minute",
            "rate_limit_per_minute",
            0,
            1_000_000,
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        for key in [
            "base_url",
            "api_key",
            "chat_model",
            "rewrite_model",
            "embedding_model",
        ] {
            validate_optional_string_field(llm, &format!("llm.{}", key), key)?;
        }
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_f64_field(llm, "llm.top_p", "top_p", 0.0, 1.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
        validate_u64_field(
            llm,
            "llm.request_timeout_ms",
            "request_timeout_ms",
            1,
            3_600_000,
        )?;
        validate_u64_field(
            llm,
            "llm.rewrite_timeout_ms",
            "rewrite_timeout_ms",
            1,
            600_000,
        )?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_optional_string_field(retrieval, "retrieval.api_key", "api_key")?;
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 1_000)?;
        validate_u64_field(retrieval, "retrieval.timeout_ms", "timeout_ms", 1, 600_000)?;

        if let Some(sources) = expect_optional_object(retrieval, "sources")? {
            for (name, value) in sources {
                let path_prefix = format!("retrieval.sources.{}", name);
                if name.parse::<SourceName>().is_err() {
                    return Err(PipelineError::Configuration(format!(
                        "Invalid config at '{}': unknown source",
                        path_prefix
                    )));
                }
                let entry = value
                    .as_object()
                    .ok_or_else(|| config_type_error(&path_prefix, "object"))?;
                validate_optional_string_field(entry, &format!("{}.host", path_prefix), "host")?;
                validate_optional_string_field(
                    entry,
                    &format!("{}.namespace", path_prefix),
                    "namespace",
                )?;
                validate_u64_field(
                    entry,
                    &format!("{}.timeout_ms", path_prefix),
                    "timeout_ms",
                    1,
                    600_000,
                )?;
            }
        }
    }

    if let Some(assistant) = expect_optional_object(root, "assistant")? {
        validate_optional_string_field(assistant, "assistant.city", "city")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, PipelineError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(PipelineError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(PipelineError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() && !value.is_null() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> PipelineError {
    PipelineError::Configuration(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
