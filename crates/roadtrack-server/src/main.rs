//! Roadtrack server - always-on backend for vehicle tracking and rerouting

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roadtrack_server::config::Config;
use roadtrack_server::state::AppState;
use roadtrack_server::{api, loops};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("roadtrack_server=debug".parse()?))
        .init();

    tracing::info!("Starting Roadtrack server...");

    let config = Config::from_env();
    let port = config.server_port;
    if config.provider_api_key.is_none() {
        tracing::warn!("No routing provider credential configured; all routes will be fallback estimates");
    }
    let state = Arc::new(AppState::new(config));

    // Start background loops
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(loops::hazard_expiry_loop::run_hazard_expiry_loop(
        state.clone(),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(loops::cache_prune_loop::run_cache_prune_loop(
        state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Build the app
    let app = api::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Run server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
