//! PostgreSQL-based record backend.
//!
//! Rows live in the `records` table. Every mutation runs inside a
//! `sqlx::Transaction`, and rows read inside a transaction are locked with
//! `FOR UPDATE` so the snapshot handed to notifications matches what gets
//! committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::repository::{RecordRepository, RecordTransaction, RepositoryError, RepositoryResult};
use super::types::{ListQuery, Record, RecordPatch};

const RECORD_COLUMNS: &str =
    "id, first_name, last_name, nickname, password, email, country, created_at, updated_at";

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        id          TEXT PRIMARY KEY,
        first_name  TEXT NOT NULL DEFAULT '',
        last_name   TEXT NOT NULL DEFAULT '',
        nickname    TEXT NOT NULL DEFAULT '',
        password    TEXT NOT NULL DEFAULT '',
        email       TEXT NOT NULL DEFAULT '',
        country     TEXT NOT NULL DEFAULT '',
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL
    )
"#;

/// PostgreSQL-based record backend.
pub struct PostgresRecordBackend {
    pool: PgPool,
}

impl PostgresRecordBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `records` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> RepositoryResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        tracing::info!("records table is ready");
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for PostgresRecordBackend {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> RepositoryResult<Box<dyn RecordTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn list(&self, query: &ListQuery) -> RepositoryResult<Vec<Record>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM records", RECORD_COLUMNS));

        // Column names come from the RecordField whitelist, values are bound.
        let mut separator = " WHERE ";
        for (field, value) in &query.filters {
            builder
                .push(separator)
                .push(field.column())
                .push(" = ")
                .push_bind(value.clone());
            separator = " AND ";
        }

        builder
            .push(" ORDER BY created_at, id LIMIT ")
            .push_bind(i64::try_from(query.limit()).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows = builder
            .build_query_as::<Record>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A `sqlx` transaction on the `records` table.
///
/// `sqlx` rolls back transactions that are dropped without a commit.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl RecordTransaction for PostgresTransaction {
    async fn insert(&mut self, record: &Record) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO records (id, first_name, last_name, nickname, password, email, country, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.nickname)
        .bind(&record.password)
        .bind(&record.email)
        .bind(&record.country)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RepositoryError::Duplicate(record.id.clone()))
            }
            Err(e) => Err(RepositoryError::Postgres(e)),
        }
    }

    async fn find(&mut self, id: &str) -> RepositoryResult<Option<Record>> {
        let record = sqlx::query_as::<_, Record>(&format!(
            "SELECT {} FROM records WHERE id = $1 FOR UPDATE",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn update(
        &mut self,
        id: &str,
        patch: &RecordPatch,
        now: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        if patch.is_empty() {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE id = $1")
                .bind(id)
                .fetch_one(&mut *self.tx)
                .await?;
            return Ok(count as u64);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE records SET updated_at = ");
        builder.push_bind(now);
        for (field, value) in patch.present_fields() {
            builder
                .push(", ")
                .push(field.column())
                .push(" = ")
                .push_bind(value.to_string());
        }
        builder.push(" WHERE id = ").push_bind(id.to_string());

        let result = builder.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&mut self, id: &str) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
