use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, health, query};
use crate::server::rate_limit::enforce_rate_limit;
use crate::state::AppState;

/// Creates the application router.
///
/// `/` and `/health` are always reachable; the `/api` routes sit behind the
/// shared rate limiter. CORS and HTTP tracing wrap everything.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.server.cors_allowed_origins);

    let api = Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/query", post(query::query))
        .route_layer(from_fn_with_state(state.clone(), enforce_rate_limit));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .map(|origin| origin.trim())
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                        None
                    }
                })
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
