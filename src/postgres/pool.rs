//! PostgreSQL connection pool with startup retry.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Errors that can occur with the PostgreSQL pool.
#[derive(Debug, Error)]
pub enum PostgresPoolError {
    #[error("Connection unavailable after {attempts} attempts: {source}")]
    ConnectionUnavailable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
}

/// PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresPool {
    /// The underlying connection pool
    pool: PgPool,

    /// Database URL (for logging purposes)
    database_url: String,
}

impl PostgresPool {
    /// Create a new PostgreSQL pool from configuration.
    ///
    /// The database is often still starting when the service comes up, so the
    /// first connection is retried `connect_retries` times with a fixed delay.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, PostgresPoolError> {
        let masked = mask_url(&config.url);
        let attempts = config.connect_retries.max(1);
        let delay = Duration::from_millis(config.connect_retry_delay_ms);

        let mut attempt = 0;
        let pool = loop {
            attempt += 1;
            match Self::connect(config).await {
                Ok(pool) => break pool,
                Err(e) if attempt < attempts => {
                    tracing::info!(
                        attempt = attempt,
                        max_attempts = attempts,
                        database_url = %masked,
                        error = %e,
                        "Database is not ready, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(PostgresPoolError::ConnectionUnavailable {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        };

        tracing::info!(
            pool_size = config.pool_size,
            database_url = %masked,
            "PostgreSQL connection pool created"
        );

        Ok(Self {
            pool,
            database_url: config.url.clone(),
        })
    }

    async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
            .connect(&config.url)
            .await
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the database URL (masked for logging).
    pub fn database_url_masked(&self) -> String {
        mask_url(&self.database_url)
    }
}

/// Replace the password part of a connection URL with `***`.
fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let prefix = &url[..colon_pos + 1];
            let suffix = &url[at_pos..];
            return format!("{}***{}", prefix, suffix);
        }
    }
    url.to_string()
}
