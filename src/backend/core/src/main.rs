//! Menugate Server - Main entry point
//!
//! Hierarchical role-based menu authorization with group membership sync.

use std::sync::Arc;
use std::time::Duration;

use menugate_core::{
    api::{self, AppState},
    config::Config,
    service::MenugateService,
    sync::InMemoryMembershipStore,
    telemetry,
};

const CONFIG_PATH_ENV: &str = "MENUGATE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: Could not load config: {}. Using defaults.", e);
            Config::default()
        }),
    };

    // Initialize logging and metrics
    let metrics = telemetry::init_telemetry(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        snapshot = ?config.snapshot.path,
        "Starting Menugate Server"
    );

    // Group membership lives in memory until an external directory is wired in
    let membership = Arc::new(InMemoryMembershipStore::new());
    let service = MenugateService::from_config(&config, membership)?;

    if config.snapshot.path.is_some() && !config.snapshot.refresh_interval.is_zero() {
        tokio::spawn(refresh_snapshot(
            service.clone(),
            config.snapshot.refresh_interval,
        ));
    }

    let app = api::build_router(AppState::new(service, metrics));

    let addr = config.server.bind_address();
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Re-read the snapshot file on a fixed interval.
///
/// A failed reload keeps the previous snapshot in place. Roles whose group
/// mappings changed are synced by the reload itself.
async fn refresh_snapshot(service: MenugateService, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately; the snapshot was just loaded.
    interval.tick().await;

    loop {
        interval.tick().await;
        let worker = service.clone();
        match tokio::task::spawn_blocking(move || worker.reload_snapshot()).await {
            Ok(Ok(outcome)) => {
                tracing::debug!(
                    changed = outcome.changed,
                    invalidated = outcome.invalidated,
                    synced = outcome.syncs.len(),
                    "Periodic snapshot refresh complete"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Periodic snapshot refresh failed, keeping previous snapshot");
            }
            Err(e) => {
                tracing::error!(error = %e, "Snapshot refresh task panicked");
            }
        }
    }
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
