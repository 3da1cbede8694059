// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Taskboard server
//!
//! Serves the auth flows and the session-guarded dashboard on top of the
//! hosted auth and table APIs.

use std::sync::Arc;
use taskboard::{config::Config, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Without a backend connection no guard decision can be trusted.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration, refusing to start");
            return Err(e.into());
        }
    };

    if config.supabase_jwt_secret.is_none() {
        tracing::warn!("SUPABASE_JWT_SECRET not set, edge pre-filter checks token expiry only");
    }
    tracing::info!(
        port = config.port,
        backend = %config.supabase_url,
        "Starting Taskboard"
    );

    let state = Arc::new(AppState::new(config.clone())?);

    // Build router
    let app = taskboard::routes::create_router(state);

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

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,taskboard=debug"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
