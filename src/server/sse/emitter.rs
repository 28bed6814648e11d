use std::sync::Arc;

use tokio::sync::mpsc;

use super::protocol::PipelineEvent;
use super::sanitize::{sanitize, sanitize_bundle, SanitizeMode};
use crate::llm::{ChatRequest, LlmProvider};
use crate::rag::ContextBundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Idle,
    ContextSent,
    Streaming,
    Completed,
    Failed,
}

impl EmitterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EmitterState::Completed | EmitterState::Failed)
    }
}

/// Why the emitter stopped before the generation stream was exhausted.
#[derive(Debug)]
enum Halt {
    /// The client stopped reading; nothing more may be sent.
    Disconnected,
    /// The terminal error event has been sent.
    Failed,
}

/// Writes one request's event sequence into the outbound channel.
///
/// The context event goes first, then the answer deltas in generation
/// order, then exactly one of `done` or `error`. Dropping the receiving
/// half stops the emitter and releases the generation stream.
pub struct StreamEmitter {
    tx: mpsc::Sender<String>,
    state: EmitterState,
}

impl StreamEmitter {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            state: EmitterState::Idle,
        }
    }

    /// Drives the stream to a terminal state and returns it.
    ///
    /// A client disconnect leaves the emitter in the last state it reached.
    pub async fn run(
        mut self,
        bundle: ContextBundle,
        provider: Arc<dyn LlmProvider>,
        request: ChatRequest,
        model: String,
    ) -> EmitterState {
        if let Err(Halt::Disconnected) = self.drive(bundle, provider, request, &model).await {
            tracing::info!(state = ?self.state, "client disconnected; stream abandoned");
        }
        self.state
    }

    async fn drive(
        &mut self,
        bundle: ContextBundle,
        provider: Arc<dyn LlmProvider>,
        request: ChatRequest,
        model: &str,
    ) -> Result<(), Halt> {
        let context = PipelineEvent::Context {
            chunks: sanitize_bundle(&bundle),
        };
        self.emit(&context).await?;
        self.state = EmitterState::ContextSent;

        let started = tokio::select! {
            _ = self.tx.closed() => return Err(Halt::Disconnected),
            started = provider.stream_chat(request, model) => started,
        };
        let mut tokens = match started {
            Ok(tokens) => tokens,
            Err(err) => return self.fail(err.to_string()).await,
        };
        self.state = EmitterState::Streaming;

        loop {
            let item = tokio::select! {
                _ = self.tx.closed() => return Err(Halt::Disconnected),
                item = tokens.recv() => item,
            };

            match item {
                Some(Ok(delta)) => {
                    let content = sanitize(&delta, SanitizeMode::Preserve);
                    if content.is_empty() {
                        continue;
                    }
                    self.emit(&PipelineEvent::Content { content }).await?;
                }
                Some(Err(err)) => return self.fail(err.to_string()).await,
                None => return self.complete().await,
            }
        }
    }

    async fn complete(&mut self) -> Result<(), Halt> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.emit(&PipelineEvent::Done).await?;
        self.state = EmitterState::Completed;
        Ok(())
    }

    async fn fail(&mut self, message: String) -> Result<(), Halt> {
        if self.state.is_terminal() {
            return Ok(());
        }
        tracing::error!(state = ?self.state, "generation failed: {}", message);
        self.state = EmitterState::Failed;
        self.send(error_frame(&message)).await?;
        Err(Halt::Failed)
    }

    /// Serializes and sends one event. A serialization failure becomes the
    /// terminal error event.
    async fn emit(&mut self, event: &PipelineEvent) -> Result<(), Halt> {
        match serde_json::to_string(event) {
            Ok(frame) => self.send(frame).await,
            Err(err) => {
                self.fail(format!("failed to serialize {} event: {}", event_name(event), err))
                    .await
            }
        }
    }

    async fn send(&self, frame: String) -> Result<(), Halt> {
        self.tx.send(frame).await.map_err(|_| Halt::Disconnected)
    }
}

fn event_name(event: &PipelineEvent) -> &'static str {
    match event {
        PipelineEvent::Context { .. } => "context",
        PipelineEvent::Content { .. } => "content",
        PipelineEvent::Error { .. } => "error",
        PipelineEvent::Done => "done",
    }
}

fn error_frame(message: &str) -> String {
    serde_json::to_string(&PipelineEvent::Error {
        error: message.to_string(),
    })
    .unwrap_or_else(|_| r#"{"type":"error","error":"stream failed"}"#.to_string())
}
