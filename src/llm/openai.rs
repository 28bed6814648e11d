use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{LlmProvider, TokenStream};
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

/// Provider for any OpenAI-compatible `/chat/completions` + `/embeddings` API.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(client: Client, settings: &LlmSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            request_timeout: settings.request_timeout,
            client,
        }
    }

    fn request_body(&self, request: ChatRequest, model_id: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.top_p { obj.insert("top_p".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
            if let Some(t) = request.presence_penalty { obj.insert("presence_penalty".to_string(), json!(t)); }
            if let Some(t) = request.frequency_penalty { obj.insert("frequency_penalty".to_string(), json!(t)); }
            if let Some(s) = request.stop { obj.insert("stop".to_string(), json!(s)); }
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request, model_id, false);

        let res = self.client.post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("chat error ({}): {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Upstream("chat response has no message content".to_string()))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<TokenStream, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request, model_id, true);

        // No total timeout here: the answer may legitimately stream for longer.
        let res = self.client.post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("stream error ({}): {}", status, text)));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseLineDecoder::default();
            loop {
                let item = tokio::select! {
                    // Consumer went away: drop the upstream response.
                    _ = tx.closed() => return,
                    item = stream.next() => item,
                };

                let Some(item) = item else {
                    for frame in decoder.finish() {
                        if forward(&tx, frame).await.is_break() {
                            return;
                        }
                    }
                    return;
                };

                match item {
                    Ok(bytes) => {
                        for frame in decoder.push(&bytes) {
                            if forward(&tx, frame).await.is_break() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::upstream(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self.client.post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("embed error ({}): {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Upstream(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

async fn forward(
    tx: &mpsc::Sender<Result<String, ApiError>>,
    frame: StreamFrame,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    match frame {
        StreamFrame::Delta(content) => {
            if tx.send(Ok(content)).await.is_err() {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }
        StreamFrame::Done => ControlFlow::Break(()),
        StreamFrame::Error(message) => {
            let _ = tx.send(Err(ApiError::Upstream(message))).await;
            ControlFlow::Break(())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamFrame {
    Delta(String),
    Done,
    Error(String),
}

/// Splits an upstream `text/event-stream` body into frames.
///
/// Lines may be split across network chunks (including inside a UTF-8
/// sequence), so bytes are buffered until a newline arrives.
#[derive(Debug, Default)]
pub(crate) struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = parse_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    pub(crate) fn finish(&mut self) -> Vec<StreamFrame> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&line)).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<StreamFrame> {
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(StreamFrame::Done);
    }

    let json: Value = match serde_json::from_str(data) {
        Ok(json) => json,
        Err(err) => return Some(StreamFrame::Error(format!("malformed stream payload: {}", err))),
    };

    if let Some(error) = json.get("error") {
        let message = error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(StreamFrame::Error(message));
    }

    json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .map(|content| StreamFrame::Delta(content.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_joins_lines_split_across_chunks() {
        let mut decoder = SseLineDecoder::default();
        let first = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(first.is_empty());

        let second = decoder.push(b"lo\"}}]}\n\ndata: [DONE]\n\n");
        assert_eq!(
            second,
            vec![StreamFrame::Delta("Hello".to_string()), StreamFrame::Done]
        );
    }

    #[test]
    fn decoder_keeps_multibyte_characters_intact() {
        let mut decoder = SseLineDecoder::default();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(
            decoder.push(&line[split..]),
            vec![StreamFrame::Delta("café".to_string())]
        );
    }

    #[test]
    fn decoder_skips_role_only_and_comment_lines() {
        let mut decoder = SseLineDecoder::default();
        let frames = decoder.push(
            b": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
        );
        assert!(frames.is_empty());
    }

    #[test]
    fn decoder_surfaces_in_stream_errors() {
        let mut decoder = SseLineDecoder::default();
        let frames = decoder.push(b"data: {\"error\":{\"message\":\"overloaded\"}}\n");
        assert_eq!(frames, vec![StreamFrame::Error("overloaded".to_string())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseLineDecoder::default();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![StreamFrame::Done]);
    }
}
