//! Text normalization for event payloads.
//!
//! `Strict` is for structured data (chunk text and metadata): every control
//! and zero-width character goes, whitespace runs become one space.
//! `Preserve` is for model output: line structure survives so markdown still
//! renders, only stray control characters are dropped.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::rag::{ContextBundle, RetrievedChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanitizeMode {
    Strict,
    Preserve,
}

pub fn sanitize(text: &str, mode: SanitizeMode) -> String {
    match mode {
        SanitizeMode::Strict => sanitize_strict(text),
        SanitizeMode::Preserve => sanitize_preserve(text),
    }
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

pub fn sanitize_strict(text: &str) -> String {
    let visible: String = text
        .chars()
        .filter(|c| !is_zero_width(*c))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    whitespace_run().replace_all(&visible, " ").trim().to_string()
}

pub fn sanitize_preserve(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .map(|c| if c == '\r' { '\n' } else { c })
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .filter(|c| !is_zero_width(*c))
        .collect()
}

/// Strict-mode copy of a bundle: chunk text and scalar string metadata.
pub fn sanitize_bundle(bundle: &ContextBundle) -> ContextBundle {
    let by_source = bundle
        .by_source
        .iter()
        .map(|(source, chunks)| (*source, chunks.iter().map(sanitize_chunk).collect()))
        .collect();
    ContextBundle { by_source }
}

fn sanitize_chunk(chunk: &RetrievedChunk) -> RetrievedChunk {
    let metadata = chunk
        .metadata
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => Value::String(sanitize_strict(s)),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect();

    RetrievedChunk {
        text: sanitize_strict(&chunk.text),
        metadata,
        ..chunk.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::SourceName;
    use serde_json::{json, Map};

    #[test]
    fn strict_collapses_whitespace_and_drops_controls() {
        assert_eq!(
            sanitize_strict("  Tony's\r\n\tPizza\u{0007} \u{200B}Napoletana \n"),
            "Tony's Pizza Napoletana"
        );
    }

    #[test]
    fn strict_leaves_quotes_for_the_serializer() {
        assert_eq!(sanitize_strict(r#"the "best" \ pizza"#), r#"the "best" \ pizza"#);
    }

    #[test]
    fn preserve_keeps_markdown_structure() {
        let answer = "## Picks\r\n\n- **Tony's**\n\t- $$\u{0000}";
        assert_eq!(sanitize_preserve(answer), "## Picks\n\n- **Tony's**\n\t- $$");
    }

    #[test]
    fn preserve_keeps_leading_and_trailing_spaces_in_deltas() {
        assert_eq!(sanitize(" world ", SanitizeMode::Preserve), " world ");
        assert_eq!(sanitize(" world ", SanitizeMode::Strict), "world");
    }

    #[test]
    fn bundle_sanitization_touches_text_and_string_metadata_only() {
        let mut metadata = Map::new();
        metadata.insert("title".into(), json!("Line\nbreak"));
        metadata.insert("rating".into(), json!(4.5));
        metadata.insert("tags".into(), json!(["a\nb"]));

        let mut bundle = ContextBundle::default();
        bundle.by_source.insert(
            SourceName::Wikipedia,
            vec![RetrievedChunk {
                id: "wikipedia-x-1".into(),
                text: "first\n\nsecond".into(),
                token_count: 3,
                metadata,
                similarity: 0.4,
                source: SourceName::Wikipedia,
                rank: 1,
            }],
        );

        let clean = sanitize_bundle(&bundle);
        let chunk = &clean.chunks(SourceName::Wikipedia)[0];

        assert_eq!(chunk.text, "first second");
        assert_eq!(chunk.metadata["title"], json!("Line break"));
        assert_eq!(chunk.metadata["rating"], json!(4.5));
        assert_eq!(chunk.metadata["tags"], json!(["a\nb"]));
        assert_eq!(chunk.id, "wikipedia-x-1");
    }
}
