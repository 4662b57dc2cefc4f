//! Transactional record lifecycle plus notification publishing.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use futures::stream::{self, BoxStream};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::metrics::RecordMetrics;
use crate::notification::{NotificationKind, NotificationMessage, Notifier};

use super::repository::{RecordRepository, RecordTransaction, RepositoryError};
use super::types::{ListQuery, NewRecord, Record, RecordPatch};

const MISSING_ID: &str = "missing or empty 'id' field";

/// Errors returned by [`RecordStore`] operations.
///
/// Storage failures are logged where they happen and surface as `Internal`
/// without details.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal server error")]
    Internal,
}

impl RecordError {
    /// Stable outcome label for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::InvalidArgument(_) => "invalid_argument",
            RecordError::NotFound(_) => "not_found",
            RecordError::Internal => "internal",
        }
    }

    fn not_found(id: &str) -> Self {
        RecordError::NotFound(format!("record '{}' not found", id))
    }
}

/// Result of a backing store probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub backend: &'static str,
}

/// Owns create/patch/delete/list against a [`RecordRepository`] and publishes
/// one notification per delivery target for every committed mutation.
///
/// Commit and submission of one mutation happen under the publish gate, so
/// notifications enter the notifier in commit order.
///
/// While the notification queue is full the gate stays held, and every other
/// mutation waits at its commit with its transaction open. On PostgreSQL each
/// waiter pins a pooled connection, so a queue that stays full can exhaust the
/// pool; new requests then time out acquiring a connection and `/health`
/// reports the store as unhealthy until the consumer catches up.
pub struct RecordStore {
    repository: Arc<dyn RecordRepository>,
    notifier: Arc<dyn Notifier>,
    targets: Arc<[String]>,
    publish_gate: Mutex<()>,
}

impl RecordStore {
    pub fn new(
        repository: Arc<dyn RecordRepository>,
        notifier: Arc<dyn Notifier>,
        targets: Vec<String>,
    ) -> Self {
        Self {
            repository,
            notifier,
            targets: targets.into(),
            publish_gate: Mutex::new(()),
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn backend_type(&self) -> &'static str {
        self.repository.backend_type()
    }

    /// Insert a new record and return its generated id.
    #[tracing::instrument(name = "record.create", skip_all)]
    pub async fn create(&self, attributes: NewRecord) -> Result<String, RecordError> {
        let result = self.create_inner(attributes).await;
        observe("create", &result);
        result
    }

    async fn create_inner(&self, attributes: NewRecord) -> Result<String, RecordError> {
        if let Some(field) = attributes.missing_required_field() {
            return Err(RecordError::InvalidArgument(format!(
                "empty or missing '{}' field",
                field
            )));
        }

        let record = Record::new(Uuid::new_v4().to_string(), attributes, now());
        let id = record.id.clone();

        let mut tx = self.begin("create").await?;
        if let Err(e) = tx.insert(&record).await {
            return Err(abort(tx, "create", &id, e).await);
        }

        self.commit_and_publish(tx, "create", NotificationKind::Add, Arc::new(record))
            .await?;

        tracing::debug!(record_id = %id, "Record created");
        Ok(id)
    }

    /// Apply the present fields of `patch` to an existing record.
    #[tracing::instrument(name = "record.patch", skip(self, patch))]
    pub async fn patch(&self, id: &str, patch: RecordPatch) -> Result<(), RecordError> {
        let result = self.patch_inner(id, patch).await;
        observe("patch", &result);
        result
    }

    async fn patch_inner(&self, id: &str, patch: RecordPatch) -> Result<(), RecordError> {
        if id.is_empty() {
            return Err(RecordError::InvalidArgument(MISSING_ID.to_string()));
        }

        let mut tx = self.begin("patch").await?;

        match tx.update(id, &patch, now()).await {
            Ok(0) => return Err(not_found(tx, id).await),
            Ok(_) => {}
            Err(e) => return Err(abort(tx, "patch", id, e).await),
        }

        // Re-read inside the transaction so the snapshot is the committed row
        let record = match tx.find(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(not_found(tx, id).await),
            Err(e) => return Err(abort(tx, "patch", id, e).await),
        };

        self.commit_and_publish(tx, "patch", NotificationKind::Update, Arc::new(record))
            .await
    }

    /// Remove a record. Subscribers receive the row as it was before deletion.
    #[tracing::instrument(name = "record.delete", skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), RecordError> {
        let result = self.delete_inner(id).await;
        observe("delete", &result);
        result
    }

    async fn delete_inner(&self, id: &str) -> Result<(), RecordError> {
        if id.is_empty() {
            return Err(RecordError::InvalidArgument(MISSING_ID.to_string()));
        }

        let mut tx = self.begin("delete").await?;

        let record = match tx.find(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(not_found(tx, id).await),
            Err(e) => return Err(abort(tx, "delete", id, e).await),
        };

        match tx.delete(id).await {
            Ok(0) => return Err(not_found(tx, id).await),
            Ok(_) => {}
            Err(e) => return Err(abort(tx, "delete", id, e).await),
        }

        self.commit_and_publish(tx, "delete", NotificationKind::Delete, Arc::new(record))
            .await
    }

    /// One page of records matching `query`.
    ///
    /// The page is read in full before streaming starts. The stream is finite;
    /// calling `list` again re-reads the backing store.
    #[tracing::instrument(
        name = "record.list",
        skip(self, query),
        fields(page = query.page, page_size = query.page_size, filters = query.filters.len())
    )]
    pub async fn list(&self, query: ListQuery) -> Result<BoxStream<'static, Record>, RecordError> {
        let result = match self.repository.list(&query).await {
            Ok(rows) => {
                tracing::debug!(rows = rows.len(), "Records listed");
                Ok(Box::pin(stream::iter(rows)) as BoxStream<'static, Record>)
            }
            Err(e) => {
                tracing::error!(operation = "list", error = %e, "Failed to list records");
                Err(RecordError::Internal)
            }
        };
        observe("list", &result);
        result
    }

    /// Probe the backing store. Never fails; problems are logged.
    pub async fn check_health(&self) -> HealthStatus {
        let is_healthy = match self.repository.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Backing store health check failed");
                false
            }
        };
        HealthStatus {
            is_healthy,
            backend: self.repository.backend_type(),
        }
    }

    async fn begin(&self, operation: &str) -> Result<Box<dyn RecordTransaction>, RecordError> {
        self.repository.begin().await.map_err(|e| {
            tracing::error!(operation, error = %e, "Failed to open transaction");
            RecordError::Internal
        })
    }

    async fn commit_and_publish(
        &self,
        tx: Box<dyn RecordTransaction>,
        operation: &str,
        kind: NotificationKind,
        record: Arc<Record>,
    ) -> Result<(), RecordError> {
        let _gate = self.publish_gate.lock().await;

        if let Err(e) = tx.commit().await {
            tracing::error!(operation, record_id = %record.id, error = %e, "Failed to commit transaction");
            return Err(RecordError::Internal);
        }

        for target in self.targets.iter() {
            let message = NotificationMessage::new(target.clone(), kind, record.clone());
            if let Err(e) = self.notifier.submit(message).await {
                tracing::warn!(
                    target_url = %target,
                    kind = %kind,
                    record_id = %record.id,
                    error = %e,
                    "Notification not queued"
                );
            }
        }

        Ok(())
    }
}

/// Timestamps are kept at microsecond precision to match PostgreSQL.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn observe<T>(operation: &str, result: &Result<T, RecordError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    RecordMetrics::record(operation, outcome);
}

async fn rollback(tx: Box<dyn RecordTransaction>, id: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(record_id = %id, error = %e, "Rollback failed");
    }
}

async fn not_found(tx: Box<dyn RecordTransaction>, id: &str) -> RecordError {
    rollback(tx, id).await;
    RecordError::not_found(id)
}

async fn abort(
    tx: Box<dyn RecordTransaction>,
    operation: &str,
    id: &str,
    error: RepositoryError,
) -> RecordError {
    tracing::error!(operation, record_id = %id, error = %error, "Storage operation failed");
    rollback(tx, id).await;
    RecordError::Internal
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::notification::RecordingNotifier;
    use crate::record::MemoryRecordBackend;

    fn store(targets: &[&str]) -> (RecordStore, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let store = RecordStore::new(
            Arc::new(MemoryRecordBackend::new()),
            notifier.clone(),
            targets.iter().map(|t| t.to_string()).collect(),
        );
        (store, notifier)
    }

    fn ada() -> NewRecord {
        NewRecord {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            country: "UK".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_validates_in_order() {
        let (store, notifier) = store(&["http://a"]);

        let err = store.create(NewRecord::default()).await.unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidArgument("empty or missing 'first_name' field".to_string())
        );

        let err = store
            .create(NewRecord {
                last_name: String::new(),
                ..ada()
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidArgument("empty or missing 'last_name' field".to_string())
        );

        let err = store
            .create(NewRecord {
                email: String::new(),
                ..ada()
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidArgument("empty or missing 'email' field".to_string())
        );

        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_create_notifies_each_target() {
        let (store, notifier) = store(&["http://a", "http://b"]);
        let id = store.create(ada()).await.unwrap();

        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].target(), "http://a");
        assert_eq!(messages[1].target(), "http://b");
        for message in &messages {
            assert_eq!(message.kind(), NotificationKind::Add);
            assert_eq!(message.record().id, id);
            assert_eq!(message.record().first_name, "Ada");
        }
    }

    #[tokio::test]
    async fn test_empty_id_is_invalid() {
        let (store, notifier) = store(&["http://a"]);
        let expected = RecordError::InvalidArgument(MISSING_ID.to_string());

        assert_eq!(
            store.patch("", RecordPatch::default()).await.unwrap_err(),
            expected
        );
        assert_eq!(store.delete("").await.unwrap_err(), expected);
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_empty_patch_emits_update_without_writing() {
        let (store, notifier) = store(&["http://a"]);
        let id = store.create(ada()).await.unwrap();
        let created = notifier.take().remove(0);

        store.patch(&id, RecordPatch::default()).await.unwrap();

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), NotificationKind::Update);
        assert_eq!(messages[0].record(), created.record());
    }

    #[tokio::test]
    async fn test_delete_snapshot_is_pre_delete_row() {
        let (store, notifier) = store(&["http://a"]);
        let id = store.create(ada()).await.unwrap();
        notifier.take();

        store.delete(&id).await.unwrap();
        let messages = notifier.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), NotificationKind::Delete);
        assert_eq!(messages[0].record().email, "ada@example.com");

        assert_eq!(
            store.delete(&id).await.unwrap_err(),
            RecordError::not_found(&id)
        );
        assert!(notifier.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_restartable() {
        let (store, _notifier) = store(&[]);
        let id = store.create(ada()).await.unwrap();

        for _ in 0..2 {
            let rows: Vec<Record> = store.list(ListQuery::new(1, 10)).await.unwrap().collect().await;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].id, id);
        }
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let (store, _notifier) = store(&[]);
        let health = store.check_health().await;
        assert!(health.is_healthy);
        assert_eq!(health.backend, "memory");
    }
}
