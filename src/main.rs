// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location Tracker API Server
//!
//! Records GPS trajectories, ingests bulk uploads through a background
//! worker pool and keeps per-trajectory statistics up to date.

use location_tracker::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryStore, TrajectoryStore},
    services::{spawn_cleanup_job, TrajectoryService},
    AppState,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        storage = ?config.storage,
        workers = config.tracking.worker_count,
        "Starting Location Tracker API"
    );

    let store: Arc<dyn TrajectoryStore> = match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
    };

    let service = Arc::new(TrajectoryService::start(store, config.tracking.clone()));

    let (stop_cleanup, stop_cleanup_rx) = watch::channel(false);
    let cleanup_job = spawn_cleanup_job(
        service.clone(),
        config.tracking.cleanup_interval,
        stop_cleanup_rx,
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        service: service.clone(),
    });
    let app = location_tracker::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining background work");
    stop_cleanup.send_replace(true);
    if let Err(e) = cleanup_job.await {
        tracing::error!(error = %e, "Cleanup job panicked");
    }
    service.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("location_tracker=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
