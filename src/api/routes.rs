use axum::{
    http::{Method, Uri},
    routing::{get, patch, post},
    Router,
};

use crate::error::ServiceError;
use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::records::{
    create_record, delete_record, delete_record_without_id, list_records, patch_record,
    patch_record_without_id,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health, stats & metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Record endpoints
        .nest(
            "/api/v1",
            Router::new()
                .route("/records", post(create_record).get(list_records))
                .route(
                    "/records/",
                    patch(patch_record_without_id).delete(delete_record_without_id),
                )
                .route("/records/{id}", patch(patch_record).delete(delete_record)),
        )
}

/// Any route the service does not offer
pub async fn fallback(method: Method, uri: Uri) -> ServiceError {
    ServiceError::Unimplemented(format!("{} {} is not implemented", method, uri.path()))
}
