use std::sync::Arc;

use reqwest::Client;

use super::prompt::PromptBuilder;
use super::rewriter::{latest_user_turn, QueryRewriter};
use crate::core::config::{LlmSettings, PipelineSettings};
use crate::core::errors::PipelineError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, OpenAiProvider};
use crate::rag::{
    ContextAssembler, ContextBundle, Embedder, MultiSourceRetriever, PineconeIndex, SourceBinding,
};

/// Per-request overrides of the configured generation parameters.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

/// Everything the stream needs once retrieval has settled.
pub struct PreparedChat {
    pub search_query: String,
    pub bundle: ContextBundle,
    pub model: String,
    pub request: ChatRequest,
}

/// Request orchestration up to the generation call:
/// rewrite, embed, fan-out retrieval, assemble, build the prompt.
pub struct ChatPipeline {
    provider: Arc<dyn LlmProvider>,
    rewriter: QueryRewriter,
    embedder: Embedder,
    retriever: MultiSourceRetriever,
    assembler: ContextAssembler,
    prompt: PromptBuilder,
    llm: LlmSettings,
    top_k: usize,
}

impl ChatPipeline {
    /// Wires the HTTP-backed provider and one index client per source.
    pub fn from_settings(client: Client, settings: &PipelineSettings) -> Self {
        let provider: Arc<dyn LlmProvider> =
            Arc::new(OpenAiProvider::new(client.clone(), &settings.llm));

        let bindings = settings
            .retrieval
            .sources
            .iter()
            .map(|source| SourceBinding {
                name: source.name,
                index: Arc::new(PineconeIndex::new(
                    client.clone(),
                    &source.host,
                    &settings.retrieval.api_key,
                    source.namespace.clone(),
                )),
                timeout: source.timeout,
            })
            .collect();

        Self::new(provider, MultiSourceRetriever::new(bindings), settings)
    }

    pub fn new(
        provider: Arc<dyn LlmProvider>,
        retriever: MultiSourceRetriever,
        settings: &PipelineSettings,
    ) -> Self {
        let assembler = ContextAssembler::default();
        Self {
            rewriter: QueryRewriter::new(
                provider.clone(),
                settings.llm.rewrite_model.clone(),
                settings.city.clone(),
            )
            .with_timeout(settings.llm.rewrite_timeout),
            embedder: Embedder::new(provider.clone(), settings.llm.embedding_model.clone()),
            prompt: PromptBuilder::new(settings.city.clone(), assembler.clone()),
            assembler,
            retriever,
            provider,
            llm: settings.llm.clone(),
            top_k: settings.retrieval.top_k,
        }
    }

    pub fn provider(&self) -> Arc<dyn LlmProvider> {
        self.provider.clone()
    }

    pub fn default_top_k(&self) -> usize {
        self.top_k
    }

    pub async fn prepare(
        &self,
        history: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<PreparedChat, PipelineError> {
        let latest = latest_user_turn(history)?;

        let search_query = self.rewriter.rewrite(history).await?;
        let bundle = self.search(&search_query, self.top_k).await?;

        tracing::info!(
            search_query = %search_query,
            chunks = bundle.total_chunks(),
            "context assembled"
        );

        let messages = self.prompt.build(history, latest, &bundle);
        let request = ChatRequest {
            messages,
            temperature: Some(options.temperature.unwrap_or(self.llm.temperature)),
            top_p: Some(options.top_p.unwrap_or(self.llm.top_p)),
            max_tokens: Some(options.max_tokens.unwrap_or(self.llm.max_tokens)),
            presence_penalty: options.presence_penalty,
            frequency_penalty: options.frequency_penalty,
            stop: None,
        };

        Ok(PreparedChat {
            search_query,
            bundle,
            model: options
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.llm.chat_model.clone()),
            request,
        })
    }

    /// Embeds `query`, searches every source and assembles the bundle.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<ContextBundle, PipelineError> {
        let vector = self.embedder.embed(query).await?;
        tracing::debug!(
            sources = ?self.retriever.source_names(),
            top_k,
            dimensions = vector.len(),
            "searching sources"
        );
        let raw = self.retriever.retrieve_all(&vector, top_k).await;
        Ok(self.assembler.assemble(raw))
    }
}
