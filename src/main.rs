use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use record_hooks_service::config::Settings;
use record_hooks_service::lifecycle::ServiceLifecycle;
use record_hooks_service::notification::create_deliverer;
use record_hooks_service::record::{create_record_repository, RecordStore};
use record_hooks_service::server::{create_app, AppState};
use record_hooks_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.logging, &settings.otel)?;
    tracing::info!("Configuration loaded");

    // Backing store (waits for the database to come up)
    let repository = create_record_repository(&settings.database).await?;

    // Notification pipeline: queue and consumer run before requests are accepted
    let deliverer = create_deliverer(&settings.delivery)?;
    let lifecycle = ServiceLifecycle::start(&settings.queue, deliverer);

    if settings.delivery.targets.is_empty() {
        tracing::warn!("No delivery targets configured, mutations will not be announced");
    }

    let store = Arc::new(RecordStore::new(
        repository,
        lifecycle.notifier(),
        settings.delivery.targets.clone(),
    ));
    let state = AppState::new(settings.clone(), store, lifecycle.queue().clone());
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Stops accepting, then waits for in-flight requests
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let result = lifecycle.shutdown("server stopped").await;
    if !result.success {
        tracing::warn!("Notification pipeline did not shut down cleanly");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
