use serde::Serialize;

use crate::rag::ContextBundle;

/// Wire events of the chat stream, serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PipelineEvent {
    Context { chunks: ContextBundle },
    Content { content: String },
    Error { error: String },
    Done,
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Error { .. } | PipelineEvent::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_tagged_by_type() {
        assert_eq!(
            serde_json::to_value(PipelineEvent::Done).unwrap(),
            json!({ "type": "done" })
        );
        assert_eq!(
            serde_json::to_value(PipelineEvent::Content { content: "Hi".into() }).unwrap(),
            json!({ "type": "content", "content": "Hi" })
        );
        assert_eq!(
            serde_json::to_value(PipelineEvent::Error { error: "boom".into() }).unwrap(),
            json!({ "type": "error", "error": "boom" })
        );
        assert_eq!(
            serde_json::to_value(PipelineEvent::Context { chunks: ContextBundle::default() }).unwrap(),
            json!({ "type": "context", "chunks": {} })
        );
    }

    #[test]
    fn only_error_and_done_are_terminal() {
        assert!(PipelineEvent::Done.is_terminal());
        assert!(PipelineEvent::Error { error: String::new() }.is_terminal());
        assert!(!PipelineEvent::Content { content: String::new() }.is_terminal());
    }
}
