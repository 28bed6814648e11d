use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use super::utils::parse_json_body;
use crate::context::{latest_user_turn, GenerationOptions};
use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::server::sse::StreamEmitter;
use crate::state::AppState;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

impl ChatBody {
    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        }
    }
}

/// `POST /api/chat`: answers the latest user turn as an event stream.
///
/// Everything up to and including retrieval happens before the response
/// starts, so those failures still get a regular JSON error response.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: ChatBody = parse_json_body(&body)?;
    latest_user_turn(&body.messages)?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id, turns = body.messages.len());

    let pipeline = state.pipeline()?;
    let prepared = pipeline
        .prepare(&body.messages, body.options())
        .instrument(span.clone())
        .await?;

    let (tx, rx) = mpsc::channel::<String>(EVENT_BUFFER);
    let emitter = StreamEmitter::new(tx);
    tokio::spawn(
        emitter
            .run(prepared.bundle, pipeline.provider(), prepared.request, prepared.model)
            .instrument(span),
    );

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(Event::default().data(frame)), rx))
    });

    Ok(Sse::new(events).into_response())
}
