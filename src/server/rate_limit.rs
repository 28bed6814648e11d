use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::core::errors::ApiError;
use crate::state::AppState;

pub type SharedRateLimiter = Arc<DefaultDirectRateLimiter>;

/// One limiter shared by every API route; `None` when the limit is zero.
pub fn build_rate_limiter(requests_per_minute: u32) -> Option<SharedRateLimiter> {
    NonZeroU32::new(requests_per_minute)
        .map(|limit| Arc::new(RateLimiter::direct(Quota::per_minute(limit))))
}

pub async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
            return Err(ApiError::RateLimited);
        }
    }
    Ok(next.run(request).await)
}
