use anyhow::Context;
use dontdie_backend::config::Config;
use dontdie_backend::seed::populate_main_bucket;
use dontdie_backend::session::GameContext;
use dontdie_backend::{RateLimitConfig, create_app};
use dontdie_db::Database;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting Don't Die backend server...");
    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: port={}, db_path={}, body_limit={}KB, timeout={}s, bucket={}, player_table={}, utc_offset={}h",
        config.port,
        config.database_path,
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
        config.main_bucket,
        config.player_table,
        config.time_zone_offset_hours
    );
    tracing::info!(
        "Rate limits: play={}/sec (burst {})",
        config.rate_limit_play_per_sec,
        config.rate_limit_play_burst
    );

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("opening database at {}", config.database_path))?;

    if config.seed_static_data {
        populate_main_bucket(&db, &config.main_bucket, &config.static_data_prefix)
            .await
            .context("populating main bucket")?;
    }

    let store = Arc::new(db);
    let game = Arc::new(GameContext::new(
        store.clone(),
        store,
        config.game_settings(),
    ));
    let rate_limit = RateLimitConfig {
        play_per_sec: config.rate_limit_play_per_sec,
        play_burst: config.rate_limit_play_burst,
    };
    let app = create_app(
        game,
        config.request_body_limit,
        config.request_timeout,
        rate_limit,
    )?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await {
        tracing::error!("Axum server error: {}", e);
    }
    Ok(())
}
