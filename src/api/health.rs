//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::notification::QueueStatsSnapshot;
use crate::server::AppState;

use super::records::ensure_enabled;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub is_healthy: bool,
    pub backend: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub backend: String,
    pub delivery_targets: usize,
    pub queue: QueueStatsSnapshot,
}

/// GET /health - Probe the backing store. Always 200; the body says whether
/// the store answered.
#[tracing::instrument(name = "http.health", skip(state))]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    ensure_enabled(&state.settings.service, "health")?;

    let status = state.store.check_health().await;

    Ok(Json(HealthResponse {
        is_healthy: status.is_healthy,
        backend: status.backend.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}

/// GET /stats - Notification queue counters
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        backend: state.store.backend_type().to_string(),
        delivery_targets: state.store.targets().len(),
        queue: state.queue.stats(),
    })
}
