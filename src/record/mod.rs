//! Record storage.
//!
//! # Backend Architecture
//!
//! [`RecordStore`] runs every mutation in a transaction obtained from a
//! [`RecordRepository`] backend:
//!
//! - `PostgresRecordBackend`: the `records` table via sqlx (default)
//! - `MemoryRecordBackend`: a single in-process table for tests and local runs
//!
//! Use `create_record_repository()` to build the backend from configuration.

mod factory;
mod memory_backend;
mod postgres_backend;
mod repository;
mod store;
mod types;

pub use factory::create_record_repository;
pub use memory_backend::{MemoryRecordBackend, MemoryTransaction};
pub use postgres_backend::{PostgresRecordBackend, PostgresTransaction};
pub use repository::{RecordRepository, RecordTransaction, RepositoryError, RepositoryResult};
pub use store::{HealthStatus, RecordError, RecordStore};
pub use types::{ListQuery, NewRecord, Record, RecordField, RecordPatch, UnknownField};
