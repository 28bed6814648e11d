#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use concierge_backend::core::config::{AppPaths, ConfigService};
use concierge_backend::server::router::router;
use concierge_backend::state::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const OPENAI_KEY: &str = "sk-test";
pub const PINECONE_KEY: &str = "pc-test";

/// Stand-ins for the model API and the three vector indexes.
pub struct Upstreams {
    pub llm: MockServer,
    pub restaurant: MockServer,
    pub wikipedia: MockServer,
    pub news: MockServer,
}

impl Upstreams {
    pub async fn start() -> Self {
        Self {
            llm: MockServer::start().await,
            restaurant: MockServer::start().await,
            wikipedia: MockServer::start().await,
            news: MockServer::start().await,
        }
    }

    pub fn config(&self) -> Value {
        json!({
            "server": { "rate_limit_per_minute": 0 },
            "llm": {
                "api_key": OPENAI_KEY,
                "base_url": format!("{}/v1", self.llm.uri()),
                "chat_model": "chat-model",
                "rewrite_model": "rewrite-model",
                "embedding_model": "embed-model"
            },
            "retrieval": {
                "api_key": PINECONE_KEY,
                "top_k": 20,
                "timeout_ms": 2000,
                "sources": {
                    "restaurant": { "host": self.restaurant.uri() },
                    "wikipedia": { "host": self.wikipedia.uri() },
                    "news": { "host": self.news.uri() }
                }
            },
            "assistant": { "city": "San Francisco" }
        })
    }

    pub async fn mock_rewrite(&self, query: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": query } }]
            })))
            .mount(&self.llm)
            .await;
    }

    pub async fn mock_embeddings(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", format!("Bearer {}", OPENAI_KEY).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }]
            })))
            .mount(&self.llm)
            .await;
    }

    pub async fn mock_generation(&self, body: String) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&self.llm)
            .await;
    }

    pub async fn mock_index(&self, server: &MockServer, matches: Value) {
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("Api-Key", PINECONE_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": matches })))
            .mount(server)
            .await;
    }

    /// Every index answers with one match shaped like its real metadata.
    pub async fn mock_all_indexes(&self) {
        self.mock_index(&self.restaurant, restaurant_matches()).await;
        self.mock_index(&self.wikipedia, wikipedia_matches()).await;
        self.mock_index(&self.news, news_matches()).await;
    }

    /// The last streaming request sent to the model, as JSON.
    pub async fn generation_request(&self) -> Option<Value> {
        let requests = self.llm.received_requests().await?;
        requests
            .iter()
            .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
            .filter(|body| body["stream"] == json!(true))
            .last()
    }
}

pub fn restaurant_matches() -> Value {
    json!([
        {
            "id": "rest-1",
            "score": 0.91,
            "metadata": {
                "text": "Handmade pasta and\nwood-fired pizza.",
                "restaurant_name": "Tony's Pizza Napoletana",
                "type": "restaurant_overview",
                "rating": 4.6,
                "price_range": "$$",
                "address": "1570 Stockton St"
            }
        },
        {
            "id": "rest-2",
            "score": 0.32,
            "metadata": {
                "text": "Margherita pizza",
                "restaurant_name": "Tony's Pizza Napoletana",
                "type": "menu_item",
                "item_name": "Margherita",
                "category": "Pizza"
            }
        }
    ])
}

pub fn wikipedia_matches() -> Value {
    json!([{
        "id": "wiki-1",
        "score": 0.74,
        "metadata": {
            "text": "North Beach is San Francisco's Little Italy.",
            "title": "North Beach",
            "summary": "A neighborhood in San Francisco.",
            "url": "https://en.wikipedia.org/wiki/North_Beach"
        }
    }])
}

pub fn news_matches() -> Value {
    json!([{
        "id": "rest-1",
        "score": 0.55,
        "metadata": {
            "text": "A new trattoria opened in North Beach.",
            "title": "Trattoria opens",
            "publish_date": "2024-05-02",
            "url": "https://news.example/trattoria",
            "author": "J. Doe"
        }
    }])
}

/// An OpenAI-style streaming body carrying `deltas`, then `tail`.
pub fn sse_body(deltas: &[&str], tail: &str) -> String {
    let mut body = String::from("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for delta in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": delta } }] })
        ));
    }
    body.push_str(tail);
    body
}

pub const DONE: &str = "data: [DONE]\n\n";

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn(config: Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::rooted_at(dir.path()));
        let state = AppState::with_config(ConfigService::from_value(paths, config)).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap(),
            _dir: dir,
        }
    }

    pub async fn post(&self, route: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, route))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, route: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, route))
            .send()
            .await
            .unwrap()
    }
}

/// Splits a finished `text/event-stream` body into its JSON payloads.
pub fn parse_events(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            let data: String = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
                .collect::<Vec<_>>()
                .join("\n");
            serde_json::from_str(&data).unwrap()
        })
        .collect()
}

pub fn event_types(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|event| event["type"].as_str().unwrap_or_default().to_string())
        .collect()
}
