use crate::llm::ChatMessage;
use crate::rag::{ContextAssembler, ContextBundle, SourceName};

/// Builds the message list for the grounded answer.
pub struct PromptBuilder {
    city: String,
    assembler: ContextAssembler,
}

impl PromptBuilder {
    pub fn new(city: impl Into<String>, assembler: ContextAssembler) -> Self {
        Self {
            city: city.into(),
            assembler,
        }
    }

    /// System message, every prior turn except the last, then one user
    /// message carrying `latest_user_turn` and the rendered source blocks.
    pub fn build(
        &self,
        history: &[ChatMessage],
        latest_user_turn: &str,
        bundle: &ContextBundle,
    ) -> Vec<ChatMessage> {
        let prior = history.split_last().map(|(_, prior)| prior).unwrap_or(&[]);

        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt()));
        messages.extend(prior.iter().cloned());
        messages.push(ChatMessage::user(self.user_prompt(latest_user_turn, bundle)));
        messages
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are a local dining concierge for {city}. Only recommend places in {city}; \
             politely decline requests about other cities.\n\
             \n\
             You receive three kinds of context with every question: restaurant data, \
             Wikipedia background and local news. When answering:\n\
             1. Reason over all three context types before answering, giving priority to \
             the one that matches the request (restaurant data for recommendations, \
             Wikipedia for history or background, news for openings and recent events).\n\
             2. Cite only the sources you actually used, inline, in these formats: \
             [Restaurant: <name>], [Wikipedia: <title>], [News: <title>, <date>].\n\
             3. Say explicitly when information is missing or when sources conflict, and \
             state your confidence (high, medium or low).\n\
             4. End with a footer in this form:\n\
             ---\n\
             Selection criteria: <how you picked the results>\n\
             Sources used: <citations>\n\
             Confidence: <high|medium|low>\n\
             Notes: <gaps, conflicts or caveats>",
            city = self.city
        )
    }

    fn user_prompt(&self, latest_user_turn: &str, bundle: &ContextBundle) -> String {
        let rendered = self.assembler.render(bundle);

        let mut prompt = String::new();
        prompt.push_str(latest_user_turn.trim());
        for source in SourceName::ALL {
            prompt.push_str("\n\n");
            prompt.push_str(section_header(source));
            prompt.push('\n');
            prompt.push_str(rendered.block(source));
        }
        prompt
    }
}

fn section_header(source: SourceName) -> &'static str {
    match source {
        SourceName::Restaurant => "=== RESTAURANT DATA ===",
        SourceName::Wikipedia => "=== WIKIPEDIA CONTEXT ===",
        SourceName::News => "=== NEWS CONTEXT ===",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::rag::{RawMatch, NO_CONTEXT_MARKER};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn builder() -> PromptBuilder {
        PromptBuilder::new("San Francisco", ContextAssembler::default())
    }

    fn bundle_with_restaurant_only() -> ContextBundle {
        let mut raw = BTreeMap::new();
        raw.insert(
            SourceName::Restaurant,
            vec![RawMatch {
                id: "r1".into(),
                score: Some(0.8),
                metadata: json!({ "text": "Wood-fired pizza", "restaurant_name": "Tony's" })
                    .as_object()
                    .cloned()
                    .unwrap(),
            }],
        );
        raw.insert(SourceName::Wikipedia, vec![]);
        raw.insert(SourceName::News, vec![]);
        ContextAssembler::default().assemble(raw)
    }

    #[test]
    fn message_order_is_system_prior_then_synthesized_user() {
        let history = vec![
            ChatMessage::user("Any pizza?"),
            ChatMessage::assistant("Try Tony's."),
            ChatMessage::user("Is it expensive?"),
        ];

        let messages = builder().build(&history, "Is it expensive?", &bundle_with_restaurant_only());

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], history[0]);
        assert_eq!(messages[2], history[1]);
        assert_eq!(messages[3].role, Role::User);
        assert!(messages[3].content.starts_with("Is it expensive?"));
    }

    #[test]
    fn blocks_follow_the_fixed_source_order() {
        let messages = builder().build(
            &[ChatMessage::user("pizza")],
            "pizza",
            &bundle_with_restaurant_only(),
        );
        let user = &messages[1].content;

        let restaurant = user.find("=== RESTAURANT DATA ===").unwrap();
        let wikipedia = user.find("=== WIKIPEDIA CONTEXT ===").unwrap();
        let news = user.find("=== NEWS CONTEXT ===").unwrap();
        assert!(restaurant < wikipedia && wikipedia < news);

        assert!(user.contains("Restaurant: Tony's"));
        assert!(user.ends_with(&format!("=== NEWS CONTEXT ===\n{}", NO_CONTEXT_MARKER)));
    }

    #[test]
    fn system_prompt_names_city_and_citation_formats() {
        let system = builder().system_prompt();
        assert!(system.contains("San Francisco"));
        assert!(system.contains("[Restaurant: <name>]"));
        assert!(system.contains("[News: <title>, <date>]"));
        assert!(system.contains("Confidence:"));
    }
}
