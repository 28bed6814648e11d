use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use concierge_backend::core::logging;
use concierge_backend::server::router::router;
use concierge_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize()?;
    logging::init(&state.paths);

    if let Ok(document) = state.config.load_config() {
        tracing::debug!(
            "Effective config: {}",
            state.config.redact_sensitive_values(&document)
        );
    }

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(state.server.port);
    let bind_addr = format!("{}:{}", state.server.host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!(
        city = %state.city(),
        rate_limit_per_minute = state.server.rate_limit_per_minute,
        "Listening on {}",
        addr
    );

    let app: Router = router(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
