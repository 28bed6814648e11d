mod common;

use common::{TestApp, Upstreams};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn query_filters_by_score_threshold() {
    let upstreams = Upstreams::start().await;
    upstreams.mock_embeddings().await;
    upstreams.mock_all_indexes().await;

    let app = TestApp::spawn(upstreams.config()).await;
    let response = app
        .post("/api/query", &json!({ "query": "  pizza  ", "scoreThreshold": 0.5 }))
        .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["query"], "pizza");
    assert_eq!(body["totalResults"], 3);

    let restaurant = body["chunks"]["restaurant"].as_array().unwrap();
    assert_eq!(restaurant.len(), 1);
    assert_eq!(restaurant[0]["metadata"]["restaurant_name"], "Tony's Pizza Napoletana");
    assert_eq!(body["chunks"]["news"][0]["id"], "news-rest-1-1");
}

#[tokio::test]
async fn query_forwards_top_k_and_skips_rewriting() {
    let upstreams = Upstreams::start().await;
    upstreams.mock_embeddings().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstreams.llm)
        .await;
    for index in [&upstreams.restaurant, &upstreams.wikipedia, &upstreams.news] {
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(json!({ "topK": 5, "includeMetadata": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
            .expect(1)
            .mount(index)
            .await;
    }

    let app = TestApp::spawn(upstreams.config()).await;
    let response = app
        .post("/api/query", &json!({ "query": "tacos", "topK": 5 }))
        .await;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["totalResults"], 0);
    assert_eq!(
        body["chunks"],
        json!({ "restaurant": [], "wikipedia": [], "news": [] })
    );
}

#[tokio::test]
async fn query_rejects_out_of_range_parameters() {
    let upstreams = Upstreams::start().await;
    let app = TestApp::spawn(upstreams.config()).await;

    for body in [
        json!({ "query": "" }),
        json!({ "query": "tacos", "topK": 0 }),
        json!({ "query": "tacos", "topK": 51 }),
        json!({ "query": "tacos", "scoreThreshold": 2.0 }),
    ] {
        let response = app.post("/api/query", &body).await;
        assert_eq!(response.status(), 400, "body: {}", body);
        let error: Value = response.json().await.unwrap();
        assert_eq!(error["code"], "INVALID_INPUT");
    }
}

#[tokio::test]
async fn root_and_health_describe_the_service() {
    let upstreams = Upstreams::start().await;
    let app = TestApp::spawn(upstreams.config()).await;

    let root: Value = app.get("/").await.json().await.unwrap();
    assert_eq!(root["status"], "operational");
    assert_eq!(root["name"], "concierge-backend");
    assert_eq!(root["city"], "San Francisco");

    let health: Value = app.get("/health").await.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["uptime_secs"].is_u64());
}

#[tokio::test]
async fn api_routes_are_rate_limited() {
    let upstreams = Upstreams::start().await;
    let mut config = upstreams.config();
    config["server"]["rate_limit_per_minute"] = json!(1);
    let app = TestApp::spawn(config).await;

    let first = app.post("/api/query", &json!({ "query": "" })).await;
    assert_eq!(first.status(), 400);

    let second = app.post("/api/query", &json!({ "query": "" })).await;
    assert_eq!(second.status(), 429);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMITED");

    assert_eq!(app.get("/health").await.status(), 200);
}
