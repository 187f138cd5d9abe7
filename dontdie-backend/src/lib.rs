pub mod commands;
pub mod config;
pub mod criteria;
pub mod dataset;
pub mod entity_cache;
pub mod error;
pub mod helpers;
pub mod output;
pub mod record;
mod routes;
pub mod seed;
pub mod session;
pub mod systems;
pub mod validation;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::session::GameContext;

pub struct AppState {
    pub game: Arc<GameContext>,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for /play
    pub play_per_sec: u64,
    /// Burst size for /play
    pub play_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            play_per_sec: 20,
            play_burst: 40,
        }
    }
}

/// Create the application router with the given game context and configuration
pub fn create_app(
    game: Arc<GameContext>,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
) -> anyhow::Result<Router> {
    let state = Arc::new(AppState { game });

    let play_governor = GovernorConfigBuilder::default()
        .per_second(rate_limit.play_per_sec.max(1))
        .burst_size(rate_limit.play_burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?;

    let play_routes = Router::new()
        .route("/play", post(routes::play))
        .layer(GovernorLayer::new(play_governor));

    Ok(Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(play_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state))
}
