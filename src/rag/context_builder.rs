//! Context assembly.
//!
//! Converts raw index matches into [`RetrievedChunk`]s and renders one
//! bordered text block per source for the prompt:
//! 1. Annotate each match with source, rank, similarity and token count
//! 2. Render a fixed-width block per chunk with a short text preview
//! 3. Substitute an explicit marker for sources with no chunks

use std::collections::BTreeMap;

use serde_json::Value;

use super::types::{ContextBundle, RawMatch, RetrievedChunk, SourceName};

/// Rendered in place of a source block when the source produced nothing.
pub const NO_CONTEXT_MARKER: &str = "NO RELEVANT CONTEXT FOUND";

const ELLIPSIS: &str = "...";
const BLOCK_WIDTH: usize = 60;

/// Configuration for context rendering.
#[derive(Debug, Clone)]
pub struct ContextBuilderConfig {
    /// Maximum number of chunks rendered per source
    pub max_chunks_per_source: usize,
    /// Maximum preview length in characters, before the ellipsis
    pub preview_chars: usize,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self {
            max_chunks_per_source: 20,
            preview_chars: 150,
        }
    }
}

/// Rendered prompt context, one block per source.
#[derive(Debug, Clone, Default)]
pub struct RenderedContext {
    blocks: BTreeMap<SourceName, String>,
}

impl RenderedContext {
    /// The block for `source`; sources never rendered read as the marker.
    pub fn block(&self, source: SourceName) -> &str {
        self.blocks
            .get(&source)
            .map(String::as_str)
            .unwrap_or(NO_CONTEXT_MARKER)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextBuilderConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextBuilderConfig) -> Self {
        Self { config }
    }

    pub fn assemble(&self, raw_by_source: BTreeMap<SourceName, Vec<RawMatch>>) -> ContextBundle {
        let by_source = raw_by_source
            .into_iter()
            .map(|(source, matches)| {
                let chunks = matches
                    .into_iter()
                    .enumerate()
                    .map(|(index, raw)| to_chunk(source, index + 1, raw))
                    .collect();
                (source, chunks)
            })
            .collect();

        ContextBundle { by_source }
    }

    pub fn render(&self, bundle: &ContextBundle) -> RenderedContext {
        let blocks = bundle
            .by_source
            .keys()
            .map(|source| (*source, self.render_source(bundle, *source)))
            .collect();
        RenderedContext { blocks }
    }

    pub fn render_source(&self, bundle: &ContextBundle, source: SourceName) -> String {
        let chunks = bundle.chunks(source);
        if chunks.is_empty() {
            return NO_CONTEXT_MARKER.to_string();
        }

        chunks
            .iter()
            .take(self.config.max_chunks_per_source)
            .map(|chunk| self.render_chunk(chunk))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_chunk(&self, chunk: &RetrievedChunk) -> String {
        let border = format!("+{}+", "-".repeat(BLOCK_WIDTH - 2));
        let mut lines = vec![
            border.clone(),
            format!(
                "| [{} #{}] Similarity: {}%",
                chunk.source.label(),
                chunk.rank,
                similarity_percent(chunk.similarity)
            ),
            format!("| {}", preview_text(&chunk.text, self.config.preview_chars)),
        ];

        for line in self.metadata_lines(chunk) {
            lines.push(format!("| {}", line));
        }
        lines.push(border);
        lines.join("\n")
    }

    fn metadata_lines(&self, chunk: &RetrievedChunk) -> Vec<String> {
        let mut lines = Vec::new();
        match chunk.source {
            SourceName::Restaurant => {
                if let Some(name) = chunk.metadata_display("restaurant_name") {
                    lines.push(format!("Restaurant: {}", name));
                }
                let rating = chunk.metadata_display("rating");
                let price = chunk.metadata_display("price_range");
                match (rating, price) {
                    (Some(r), Some(p)) => lines.push(format!("Rating: {} | Price: {}", r, p)),
                    (Some(r), None) => lines.push(format!("Rating: {}", r)),
                    (None, Some(p)) => lines.push(format!("Price: {}", p)),
                    (None, None) => {}
                }
                if let Some(address) = chunk.metadata_display("address") {
                    lines.push(format!("Address: {}", address));
                }
                if let Some(item) = chunk.metadata_display("item_name") {
                    match chunk.metadata_display("category") {
                        Some(category) => lines.push(format!("Menu item: {} ({})", item, category)),
                        None => lines.push(format!("Menu item: {}", item)),
                    }
                }
            }
            SourceName::Wikipedia => {
                if let Some(title) = chunk.metadata_display("title") {
                    lines.push(format!("Title: {}", title));
                }
                if let Some(summary) = chunk.metadata_str("summary") {
                    lines.push(format!(
                        "Summary: {}",
                        preview_text(summary, self.config.preview_chars)
                    ));
                }
                if let Some(url) = chunk.metadata_display("url") {
                    lines.push(format!("URL: {}", url));
                }
            }
            SourceName::News => {
                if let Some(title) = chunk.metadata_display("title") {
                    lines.push(format!("Title: {}", title));
                }
                if let Some(date) = chunk
                    .metadata_display("publish_date")
                    .or_else(|| chunk.metadata_display("published_date"))
                {
                    lines.push(format!("Published: {}", date));
                }
                if let Some(url) = chunk.metadata_display("url") {
                    lines.push(format!("URL: {}", url));
                }
            }
        }
        lines
    }
}

/// Index metadata stores numbers as floats, so `42.0` counts as `42`.
fn metadata_count(value: &Value) -> Option<usize> {
    value.as_u64().map(|v| v as usize).or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as usize)
    })
}

fn to_chunk(source: SourceName, rank: usize, raw: RawMatch) -> RetrievedChunk {
    let RawMatch {
        id,
        score,
        mut metadata,
    } = raw;

    let text = match metadata.remove("text") {
        Some(Value::String(text)) => text,
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    };

    let token_count = metadata
        .get("token_count")
        .or_else(|| metadata.get("tokenCount"))
        .and_then(metadata_count)
        .unwrap_or_else(|| approximate_tokens(&text));

    let similarity = score
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    let provider_id = if id.trim().is_empty() { "unknown" } else { id.trim() };

    RetrievedChunk {
        id: format!("{}-{}-{}", source, provider_id, rank),
        text,
        token_count,
        metadata,
        similarity,
        source,
        rank,
    }
}

/// Roughly four characters per token, rounded up.
pub fn approximate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Newline-collapsed preview, cut at `max_chars` with an ellipsis.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let collapsed: String = text
        .replace("\r\n", " ")
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let mut truncated: String = collapsed.chars().take(max_chars).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

fn similarity_percent(similarity: f64) -> i64 {
    (similarity * 100.0).round() as i64
}
