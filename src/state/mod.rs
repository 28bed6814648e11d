use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use crate::context::ChatPipeline;
use crate::core::config::{AppPaths, ConfigService, ServerSettings, DEFAULT_CITY};
use crate::core::errors::PipelineError;
use crate::server::rate_limit::{build_rate_limiter, SharedRateLimiter};

pub mod error;

use error::InitializationError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across all routes.
///
/// Holds no per-request data: every chat request resolves its own settings
/// and builds its own pipeline on top of the pooled HTTP client.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub server: ServerSettings,
    pub http: Client,
    pub rate_limiter: Option<SharedRateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    /// Loads configuration from the default locations.
    pub fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        Self::with_config(config)
    }

    /// Builds the state around an existing config service.
    ///
    /// Only server settings are resolved here; missing service credentials
    /// surface per request as configuration errors.
    pub fn with_config(config: ConfigService) -> Result<Arc<Self>, InitializationError> {
        let document = config
            .load_config()
            .map_err(|e| InitializationError::Config(e.into()))?;
        let server = ServerSettings::from_config(&document);

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InitializationError::HttpClient(e.into()))?;

        Ok(Arc::new(AppState {
            paths: Arc::new(config.paths().clone()),
            rate_limiter: build_rate_limiter(server.rate_limit_per_minute),
            config,
            server,
            http,
            started_at: Instant::now(),
        }))
    }

    /// Resolves current settings into a ready pipeline.
    pub fn pipeline(&self) -> Result<ChatPipeline, PipelineError> {
        let settings = self.config.load_settings()?;
        Ok(ChatPipeline::from_settings(self.http.clone(), &settings))
    }

    pub fn city(&self) -> String {
        self.config
            .load_config()
            .ok()
            .and_then(|config| {
                config
                    .get("assistant")
                    .and_then(|v| v.get("city"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_CITY.to_string())
    }
}
