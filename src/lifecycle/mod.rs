//! Startup and shutdown of the notification pipeline.
//!
//! Startup builds the bounded queue and spawns its single consumer before any
//! request is accepted. Shutdown runs after the HTTP listener has stopped and
//! finished its in-flight requests:
//! 1. Signal the consumer to stop
//! 2. Let it drain the backlog if a drain timeout is configured
//! 3. Wait for it and report what was delivered and what was dropped

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::notification::{
    notification_queue, ConsumerReport, Deliver, NotificationQueue, Notifier, QueueStatsSnapshot,
};

/// Outcome of [`ServiceLifecycle::shutdown`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownResult {
    /// What the consumer did before stopping; empty if it could not be joined
    pub report: ConsumerReport,
    pub duration: Duration,
    /// False when the consumer task panicked or was cancelled
    pub success: bool,
}

/// Owns the notification queue and its consumer task.
pub struct ServiceLifecycle {
    queue: NotificationQueue,
    shutdown_tx: broadcast::Sender<()>,
    consumer: JoinHandle<ConsumerReport>,
    started_at: Instant,
}

impl ServiceLifecycle {
    /// Build the queue and spawn its consumer. Must be called from within a
    /// tokio runtime.
    pub fn start(config: &QueueConfig, deliverer: Arc<dyn Deliver>) -> Self {
        let (queue, consumer) = notification_queue(config.capacity);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let drain_timeout = Duration::from_millis(config.drain_timeout_ms);

        let consumer = consumer.spawn(deliverer, shutdown_rx, drain_timeout);

        tracing::info!(
            capacity = queue.capacity(),
            drain_timeout_ms = config.drain_timeout_ms,
            "Notification pipeline started"
        );

        Self {
            queue,
            shutdown_tx,
            consumer,
            started_at: Instant::now(),
        }
    }

    /// Producer handle for the record store
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::new(self.queue.clone())
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.queue.stats()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stop the consumer and wait for it to finish.
    #[tracing::instrument(name = "lifecycle.shutdown", skip(self))]
    pub async fn shutdown(self, reason: &str) -> ShutdownResult {
        let start = Instant::now();
        tracing::info!(
            reason = %reason,
            pending = self.queue.stats().pending,
            "Stopping notification consumer"
        );

        // The consumer also stops when every sender is gone, so a failed
        // send only means it has already exited.
        let _ = self.shutdown_tx.send(());

        let mut result = match self.consumer.await {
            Ok(report) => ShutdownResult {
                report,
                success: true,
                ..Default::default()
            },
            Err(e) => {
                tracing::error!(error = %e, "Notification consumer did not stop cleanly");
                ShutdownResult::default()
            }
        };
        result.duration = start.elapsed();

        tracing::info!(
            delivered = result.report.delivered,
            failed = result.report.failed,
            drained = result.report.drained,
            abandoned = result.report.abandoned,
            duration_ms = result.duration.as_millis() as u64,
            "Notification pipeline stopped"
        );

        result
    }
}
