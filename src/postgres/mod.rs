//! PostgreSQL persistence module.
//!
//! Provides connection pooling for the PostgreSQL record backend.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
