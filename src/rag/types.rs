use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One of the independently queried content backends.
///
/// The declaration order is the order sources appear in prompts and in the
/// serialized context bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    Restaurant,
    Wikipedia,
    News,
}

impl SourceName {
    pub const ALL: [SourceName; 3] = [SourceName::Restaurant, SourceName::Wikipedia, SourceName::News];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceName::Restaurant => "restaurant",
            SourceName::Wikipedia => "wikipedia",
            SourceName::News => "news",
        }
    }

    /// Human-readable label used in rendered context blocks.
    pub fn label(&self) -> &'static str {
        match self {
            SourceName::Restaurant => "Restaurant",
            SourceName::Wikipedia => "Wikipedia",
            SourceName::News => "News",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restaurant" => Ok(SourceName::Restaurant),
            "wikipedia" => Ok(SourceName::Wikipedia),
            "news" => Ok(SourceName::News),
            other => Err(format!("unknown source: {}", other)),
        }
    }
}

/// A match exactly as the vector index returned it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMatch {
    pub id: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub metadata: Map<String, Value>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A retrieved unit of text, annotated with its origin and relevance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub token_count: usize,
    pub metadata: Map<String, Value>,
    pub similarity: f64,
    pub source: SourceName,
    /// 1-based position within its source.
    pub rank: usize,
}

impl RetrievedChunk {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Scalar metadata rendered as text; strings, numbers and booleans only.
    pub fn metadata_display(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Every chunk retrieved for one request, keyed by source.
///
/// Every configured source has an entry, empty when the source returned
/// nothing or failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContextBundle {
    pub by_source: BTreeMap<SourceName, Vec<RetrievedChunk>>,
}

impl ContextBundle {
    pub fn chunks(&self, source: SourceName) -> &[RetrievedChunk] {
        self.by_source
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn total_chunks(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetrievedChunk> {
        self.by_source.values().flatten()
    }

    /// Drops chunks scoring below `threshold`; ranks are left as assigned.
    pub fn retain_min_similarity(&mut self, threshold: f64) {
        for chunks in self.by_source.values_mut() {
            chunks.retain(|chunk| chunk.similarity >= threshold);
        }
    }
}
