//! Webhook delivery.
//!
//! A sender performs exactly one outbound call per message. There is no retry,
//! no backoff and no circuit breaking; the outcome is logged and returned to
//! the queue consumer for accounting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DeliveryConfig;

use super::types::NotificationMessage;

/// Delivery errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Performs one delivery attempt for a message.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError>;
}

/// POSTs the record snapshot as JSON to `{target}/{kind}`.
///
/// Any 2xx status counts as success.
#[derive(Debug, Clone)]
pub struct HttpDeliverySender {
    client: reqwest::Client,
}

impl HttpDeliverySender {
    /// Build a sender. `request_timeout` bounds the whole request at the
    /// transport level; `None` leaves it unbounded.
    pub fn new(request_timeout: Option<Duration>) -> Result<Self, DeliveryError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(DeliveryError::Client)?;
        Ok(Self { client })
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| DeliveryError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Deliver for HttpDeliverySender {
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let url = message.url();
        let body = serde_json::to_vec(message.record())?;

        let result = self.post(&url, body).await;
        match &result {
            Ok(()) => tracing::info!(
                url = %url,
                kind = %message.kind(),
                record_id = %message.record().id,
                "Webhook delivered"
            ),
            Err(e) => tracing::warn!(
                url = %url,
                kind = %message.kind(),
                record_id = %message.record().id,
                error = %e,
                "Webhook delivery failed"
            ),
        }
        result
    }
}

/// Logs every message instead of calling out.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDeliverySender;

#[async_trait]
impl Deliver for LogDeliverySender {
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        tracing::info!(
            url = %message.url(),
            kind = %message.kind(),
            record_id = %message.record().id,
            "Webhook delivery skipped (log mode)"
        );
        Ok(())
    }
}

/// Create a delivery sender based on configuration.
///
/// - `"http"` (default): `HttpDeliverySender`
/// - `"log"`: `LogDeliverySender`
///
/// Unknown values fall back to HTTP with a warning.
pub fn create_deliverer(config: &DeliveryConfig) -> Result<Arc<dyn Deliver>, DeliveryError> {
    let timeout = config.request_timeout_seconds.map(Duration::from_secs);
    match config.mode.as_str() {
        "http" => {
            tracing::info!(mode = "http", targets = config.targets.len(), "Creating webhook sender");
            Ok(Arc::new(HttpDeliverySender::new(timeout)?))
        }
        "log" => {
            tracing::info!(mode = "log", "Creating logging webhook sender");
            Ok(Arc::new(LogDeliverySender))
        }
        other => {
            tracing::warn!(mode = %other, "Unknown delivery mode requested, falling back to http");
            Ok(Arc::new(HttpDeliverySender::new(timeout)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use chrono::Utc;

    use super::*;
    use crate::notification::NotificationKind;
    use crate::record::{NewRecord, Record};

    fn message(target: String, kind: NotificationKind) -> NotificationMessage {
        let record = Record::new(
            "r1".to_string(),
            NewRecord {
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                email: "a@b.c".to_string(),
                ..Default::default()
            },
            Utc::now(),
        );
        NotificationMessage::new(target, kind, Arc::new(record))
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_sender_posts_to_kind_path() {
        let app = Router::new().route(
            "/hooks/update",
            post(|body: axum::Json<serde_json::Value>| async move {
                if body["id"] == "r1" && body["first_name"] == "A" {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::BAD_REQUEST
                }
            }),
        );
        let base = serve(app).await;

        let sender = HttpDeliverySender::new(Some(Duration::from_secs(5))).unwrap();
        let result = sender
            .deliver(&message(format!("{}/hooks/", base), NotificationKind::Update))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_http_sender_non_success_status() {
        let app = Router::new().route("/add", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let base = serve(app).await;

        let sender = HttpDeliverySender::new(None).unwrap();
        let err = sender
            .deliver(&message(base, NotificationKind::Add))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_http_sender_transport_error() {
        let sender = HttpDeliverySender::new(Some(Duration::from_secs(2))).unwrap();
        let err = sender
            .deliver(&message("http://127.0.0.1:1".to_string(), NotificationKind::Delete))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_create_deliverer_modes() {
        let log = DeliveryConfig {
            mode: "log".to_string(),
            ..Default::default()
        };
        let sender = create_deliverer(&log).unwrap();
        assert!(sender
            .deliver(&message("http://127.0.0.1:1".to_string(), NotificationKind::Add))
            .await
            .is_ok());

        let unknown = DeliveryConfig {
            mode: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(create_deliverer(&unknown).is_ok());
    }
}
