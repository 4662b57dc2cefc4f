//! Backend traits for record storage.
//!
//! The record store only needs a small transactional surface from its backing
//! store: begin/commit/rollback, point lookup, conditional update, delete and a
//! paginated, filtered scan. Backends implement these traits so that the
//! PostgreSQL and in-memory stores can be used interchangeably.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{ListQuery, Record, RecordPatch};

/// Errors raised by a storage backend.
///
/// These never reach API callers directly; the record store logs them and
/// reports an internal error instead.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A row with the same id already exists
    #[error("Duplicate id: {0}")]
    Duplicate(String),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend could not be initialized
    #[error("Backend initialization failed: {0}")]
    Init(#[from] crate::postgres::PostgresPoolError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// An open transaction against the backing store.
///
/// Dropping a transaction without calling [`RecordTransaction::commit`] rolls
/// it back.
#[async_trait]
pub trait RecordTransaction: Send {
    /// Insert a new row.
    async fn insert(&mut self, record: &Record) -> RepositoryResult<()>;

    /// Point lookup by id.
    async fn find(&mut self, id: &str) -> RepositoryResult<Option<Record>>;

    /// Apply the present fields of `patch` to the row matching `id` and set
    /// `updated_at`. Returns the number of rows matched. An empty patch writes
    /// nothing but still reports whether the row exists.
    async fn update(
        &mut self,
        id: &str,
        patch: &RecordPatch,
        now: DateTime<Utc>,
    ) -> RepositoryResult<u64>;

    /// Delete the row matching `id`. Returns the number of rows affected.
    async fn delete(&mut self, id: &str) -> RepositoryResult<u64>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;

    async fn rollback(self: Box<Self>) -> RepositoryResult<()>;
}

/// Backing store for records.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// across request handlers.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Backend identifier for logs and health output
    fn backend_type(&self) -> &'static str;

    /// Open a new transaction.
    async fn begin(&self) -> RepositoryResult<Box<dyn RecordTransaction>>;

    /// Read one page of rows matching the query, outside of any transaction.
    ///
    /// The whole page is fetched before it is returned. Pages are capped by
    /// `service.max_page_size`, so the buffer stays bounded.
    async fn list(&self, query: &ListQuery) -> RepositoryResult<Vec<Record>>;

    /// Probe connectivity to the backing store.
    async fn ping(&self) -> RepositoryResult<()>;
}
