mod app;
mod config;
mod conversions;
mod error;
mod handlers;
mod hashing;
mod models;
mod payload;
mod state;

use std::sync::Arc;

use syzygy_common::{bind_listener, env_or, init_tracing, shutdown_signal};

use crate::config::RelayConfig;
use crate::conversions::GraphApiClient;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _guards = init_tracing("conversion-relay");

    let port = env_or("PORT", 8080u16);
    let config = RelayConfig::from_env();
    if config.access_token.is_none() {
        // Requests fail with a configuration error until the token is set.
        tracing::warn!("FB_CONVERSIONS_API_TOKEN not configured");
    }
    tracing::info!(config = ?config, "relay configuration loaded");

    let conversions = GraphApiClient::new(config.graph.clone()).expect("conversions api client");
    let state = AppState::new(config, Arc::new(conversions));

    let app = app::build_router(state);
    let listener = bind_listener(port).await;
    tracing::info!(port, "conversion relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("serve");
}
