// SPDX-License-Identifier: MIT

//! Veloclub API Server
//!
//! Serves the OAuth login flow and token lifecycle endpoints for the club
//! activity tracker.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veloclub::{
    config::Config,
    db::InMemoryUserGateway,
    services::{StravaClient, StravaService},
    session::SessionStore,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Veloclub API");

    let sessions = SessionStore::new(&config).expect("Failed to initialize session store");

    let users: Arc<dyn veloclub::db::UserGateway> = Arc::new(InMemoryUserGateway::new());

    let client = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
    )
    .expect("Failed to initialize Strava client");
    let strava = StravaService::new(client, users.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        sessions,
        users,
        strava,
    });

    // Build router
    let app = veloclub::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("veloclub=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
