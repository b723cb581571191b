// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! VRC Coach API Server
//!
//! Serves fresh Strava credentials and weekly training plans to the
//! coaching agent.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vrc_coach::{
    config::{Config, StoreBackend},
    db::{CredentialStore, FirestoreDb, MemoryDb, PlanStore},
    services::{CredentialManager, PlanService, StravaTokenRefresher},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        "Starting VRC Coach API"
    );

    let (credential_store, plan_store): (Arc<dyn CredentialStore>, Arc<dyn PlanStore>) =
        match config.store_backend {
            StoreBackend::Firestore => {
                let db = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);
                (db.clone() as Arc<dyn CredentialStore>, db as Arc<dyn PlanStore>)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                let db = Arc::new(MemoryDb::new());
                (db.clone() as Arc<dyn CredentialStore>, db as Arc<dyn PlanStore>)
            }
        };

    let refresher = StravaTokenRefresher::new(
        config.strava_token_url.clone(),
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        config.http_timeout,
    )?;

    // Lock maps are shared by every request within this instance
    let credentials = CredentialManager::new(
        credential_store,
        Arc::new(refresher),
        Arc::new(dashmap::DashMap::new()),
        config.token_refresh_margin,
        config.store_timeout,
        config.http_timeout,
    );
    let plans = PlanService::new(
        plan_store,
        Arc::new(dashmap::DashMap::new()),
        config.store_timeout,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        credentials,
        plans,
    });

    let app = vrc_coach::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vrc_coach=debug".parse().expect("valid directive"))
                .add_directive("info".parse().expect("valid directive")),
        )
        .with(format)
        .init();
}
