//! API layer - HTTP endpoint handlers.

mod health;
mod metrics;
mod records;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use records::{
    create_record, delete_record, delete_record_without_id, list_records, patch_record,
    patch_record_without_id, CreateRecordResponse,
};
pub use routes::{api_routes, fallback};
