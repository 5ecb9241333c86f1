// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! InsightDash API Server
//!
//! Username/password sessions plus a per-user Google Analytics connection:
//! OAuth consent, stored token refresh and GA4 property listing.

use insightdash::{
    config::Config,
    db::Db,
    services::{ClientSecrets, GoogleAnalyticsService, GoogleClient},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        insecure_transport = config.allow_insecure_transport,
        "Starting InsightDash API"
    );

    // Firestore when a project is configured, otherwise process memory
    let db = match &config.gcp_project_id {
        Some(project_id) => Db::new(project_id).await?,
        None => {
            tracing::warn!("GCP_PROJECT_ID not set, using in-memory store (data is not persisted)");
            Db::new_in_memory()
        }
    };

    // OAuth client credentials are read once at startup
    let secrets = ClientSecrets::from_file(&config.google_client_secrets_file)?;
    tracing::info!(
        path = %config.google_client_secrets_file.display(),
        client_id = %secrets.client_id,
        "Loaded Google client secrets"
    );

    let google_client = GoogleClient::new(&config, secrets)?;
    let google = GoogleAnalyticsService::new(google_client, db.clone(), config.oauth_state_key.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        google,
    });

    // Build router
    let app = insightdash::routes::create_router(state);

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
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("insightdash=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
