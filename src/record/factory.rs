//! Record backend factory

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::postgres::PostgresPool;

use super::memory_backend::MemoryRecordBackend;
use super::postgres_backend::PostgresRecordBackend;
use super::repository::{RecordRepository, RepositoryResult};

/// Create a record backend based on configuration.
///
/// Returns the appropriate backend implementation based on the `backend` setting:
/// - `"postgres"` (default): connects (with retry), creates the schema and
///   returns a `PostgresRecordBackend`
/// - `"memory"`: returns a `MemoryRecordBackend`
///
/// Unknown values fall back to the memory backend with a warning.
pub async fn create_record_repository(
    config: &DatabaseConfig,
) -> RepositoryResult<Arc<dyn RecordRepository>> {
    match config.backend.as_str() {
        "postgres" => {
            let pool = PostgresPool::new(config).await?;
            tracing::info!(
                backend = "postgres",
                database_url = %pool.database_url_masked(),
                "Creating PostgreSQL record backend"
            );
            let backend = PostgresRecordBackend::new(pool.pool().clone());
            backend.ensure_schema().await?;
            Ok(Arc::new(backend))
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory record backend");
            Ok(Arc::new(MemoryRecordBackend::new()))
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown record backend requested, falling back to memory"
            );
            Ok(Arc::new(MemoryRecordBackend::new()))
        }
    }
}
