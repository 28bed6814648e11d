use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::PipelineError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, Role};

/// Prior turns forwarded to the rewrite call.
const MAX_CONTEXT_TURNS: usize = 6;
const MAX_QUERY_TOKENS: usize = 3;
const REWRITE_MAX_TOKENS: u32 = 16;
pub const DEFAULT_REWRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Narrows a conversation down to a short keyword search query.
///
/// Rewriting is best effort: any failure of the model call falls back to
/// the latest user message verbatim.
pub struct QueryRewriter {
    provider: Arc<dyn LlmProvider>,
    model: String,
    city: String,
    timeout: Duration,
}

impl QueryRewriter {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            city: city.into(),
            timeout: DEFAULT_REWRITE_TIMEOUT,
        }
    }

    /// Bounds the rewrite call independently of the generation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn rewrite(&self, history: &[ChatMessage]) -> Result<String, PipelineError> {
        let latest = latest_user_turn(history)?;

        let attempt = tokio::time::timeout(self.timeout, self.try_rewrite(history))
            .await
            .unwrap_or_else(|_| {
                Err(PipelineError::RewriteFailed(format!(
                    "rewrite timed out after {}ms",
                    self.timeout.as_millis()
                )))
            });

        match attempt {
            Ok(query) => {
                tracing::debug!(query = %query, "search query rewritten");
                Ok(query)
            }
            Err(err) => {
                tracing::warn!("{}; searching with the raw user message", err);
                Ok(latest.to_string())
            }
        }
    }

    async fn try_rewrite(&self, history: &[ChatMessage]) -> Result<String, PipelineError> {
        let request = ChatRequest::new(self.rewrite_messages(history))
            .with_temperature(0.0)
            .with_max_tokens(REWRITE_MAX_TOKENS);

        let output = self
            .provider
            .chat(request, &self.model)
            .await
            .map_err(|e| PipelineError::RewriteFailed(e.to_string()))?;

        normalize_query(&output)
            .ok_or_else(|| PipelineError::RewriteFailed("model returned an empty query".to_string()))
    }

    fn rewrite_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let (last, prior) = match history.split_last() {
            Some(split) => split,
            None => return Vec::new(),
        };

        let start = prior.len().saturating_sub(MAX_CONTEXT_TURNS);
        let mut messages = Vec::with_capacity(prior.len() - start + 2);
        messages.push(ChatMessage::system(self.instruction()));
        messages.extend(
            prior[start..]
                .iter()
                .filter(|turn| turn.role != Role::System)
                .cloned(),
        );
        messages.push(ChatMessage::user(last.content.trim()));
        messages
    }

    fn instruction(&self) -> String {
        format!(
            "You turn the user's latest message into a search query for a restaurant database.\n\
             Rules:\n\
             - Output 1 to 3 lower-case keywords and nothing else.\n\
             - Keep only cuisine, dish, attribute or price keywords.\n\
             - Never include \"{city}\" or any other location already implied.\n\
             - If earlier turns established a cuisine, carry it forward unless the user changes topic.\n\
             Examples: \"Any good cheap tacos?\" -> cheap tacos; \"What about dessert?\" after Italian -> italian dessert",
            city = self.city
        )
    }
}

/// The trimmed content of the final turn, which must come from the user.
pub fn latest_user_turn(history: &[ChatMessage]) -> Result<&str, PipelineError> {
    let last = history
        .last()
        .ok_or_else(|| PipelineError::InvalidInput("messages must not be empty".to_string()))?;

    if last.role != Role::User {
        return Err(PipelineError::InvalidInput(
            "the last message must have role 'user'".to_string(),
        ));
    }

    let content = last.content.trim();
    if content.is_empty() {
        return Err(PipelineError::InvalidInput(
            "the last user message is empty".to_string(),
        ));
    }
    Ok(content)
}

fn normalize_query(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    let unquoted = line.trim_matches(|c: char| matches!(c, '"' | '\'' | '`'));

    let tokens: Vec<String> = unquoted
        .split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| c.is_ascii_punctuation() && c != '$')
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .take(MAX_QUERY_TOKENS)
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}
