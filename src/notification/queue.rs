//! Bounded, single-consumer notification queue.
//!
//! Producers call [`NotificationQueue::submit`], which suspends while the
//! buffer is full. One [`QueueConsumer`] pops messages in FIFO order and hands
//! each to a [`Deliver`] implementation, one at a time.
//!
//! Stop semantics: the consumer honors the shutdown signal as soon as it
//! observes it, closes the buffer so later submits fail fast, optionally keeps
//! delivering the backlog for a bounded time, then drops whatever is left and
//! reports the count.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::metrics::NotificationMetrics;

use super::notifier::Notifier;
use super::sender::Deliver;
use super::types::NotificationMessage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("notification queue is closed")]
    Closed,
}

/// Counters shared by the producer handle and the consumer
#[derive(Debug, Default)]
pub struct QueueStats {
    pub submitted: AtomicU64,
    pub rejected: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub abandoned: AtomicU64,
    /// Accepted or blocked submits not yet taken by the consumer
    pending: AtomicI64,
}

impl QueueStats {
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed).max(0) as u64
    }

    fn add_pending(&self, delta: i64) {
        let depth = self.pending.fetch_add(delta, Ordering::Relaxed) + delta;
        NotificationMetrics::set_queue_depth(depth.max(0) as usize);
    }

    pub fn snapshot(&self, capacity: usize) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            capacity,
            pending: self.pending(),
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of queue statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatsSnapshot {
    pub capacity: usize,
    pub pending: u64,
    pub submitted: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub failed: u64,
    pub abandoned: u64,
}

/// What the consumer did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerReport {
    /// Successful deliveries, including drained ones
    pub delivered: u64,
    pub failed: u64,
    /// Messages delivered after the stop signal
    pub drained: u64,
    /// Messages dropped because the consumer stopped first
    pub abandoned: u64,
}

/// Create a queue holding at most `capacity` messages.
///
/// A capacity of zero is raised to one.
pub fn notification_queue(capacity: usize) -> (NotificationQueue, QueueConsumer) {
    let capacity = if capacity == 0 {
        tracing::warn!("Notification queue capacity 0 is not allowed, using 1");
        1
    } else {
        capacity
    };

    let (tx, rx) = mpsc::channel(capacity);
    let stats = Arc::new(QueueStats::default());

    (
        NotificationQueue {
            tx,
            capacity,
            stats: stats.clone(),
        },
        QueueConsumer { rx, stats },
    )
}

/// Producer handle. Cheap to clone; all clones feed the same consumer.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<NotificationMessage>,
    capacity: usize,
    stats: Arc<QueueStats>,
}

impl NotificationQueue {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot(self.capacity)
    }
}

#[async_trait]
impl Notifier for NotificationQueue {
    async fn submit(&self, message: NotificationMessage) -> Result<(), QueueError> {
        let kind = message.kind();
        self.stats.add_pending(1);

        match self.tx.send(message).await {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                NotificationMetrics::record_submitted(kind.as_str());
                Ok(())
            }
            Err(_) => {
                self.stats.add_pending(-1);
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                NotificationMetrics::record_rejected();
                Err(QueueError::Closed)
            }
        }
    }
}

/// The single consumer of a [`NotificationQueue`].
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<NotificationMessage>,
    stats: Arc<QueueStats>,
}

impl QueueConsumer {
    /// Take the next message without delivering it.
    ///
    /// Returns `None` once every producer handle is gone and the buffer is
    /// empty.
    pub async fn recv(&mut self) -> Option<NotificationMessage> {
        let message = self.rx.recv().await;
        if message.is_some() {
            self.stats.add_pending(-1);
        }
        message
    }

    /// Run the consumer loop on its own task.
    pub fn spawn(
        self,
        deliverer: Arc<dyn Deliver>,
        shutdown: broadcast::Receiver<()>,
        drain_timeout: Duration,
    ) -> JoinHandle<ConsumerReport> {
        tokio::spawn(self.run(deliverer, shutdown, drain_timeout))
    }

    /// Deliver messages until the shutdown signal arrives (or the channel is
    /// closed), then drain or drop the backlog.
    pub async fn run(
        mut self,
        deliverer: Arc<dyn Deliver>,
        mut shutdown: broadcast::Receiver<()>,
        drain_timeout: Duration,
    ) -> ConsumerReport {
        tracing::info!("Notification consumer started");
        let mut report = ConsumerReport::default();

        loop {
            tokio::select! {
                biased;
                // Ok, Closed and Lagged all mean stop
                _ = shutdown.recv() => {
                    tracing::info!("Notification consumer received stop signal");
                    break;
                }
                message = self.recv() => match message {
                    Some(message) => self.dispatch(deliverer.as_ref(), &message, &mut report).await,
                    None => {
                        tracing::info!(
                            delivered = report.delivered,
                            failed = report.failed,
                            "All producers gone, notification consumer stopped"
                        );
                        return report;
                    }
                },
            }
        }

        self.rx.close();

        if !drain_timeout.is_zero() {
            self.drain(deliverer.as_ref(), drain_timeout, &mut report).await;
        }

        while self.rx.try_recv().is_ok() {
            self.stats.add_pending(-1);
            report.abandoned += 1;
        }
        if report.abandoned > 0 {
            self.stats
                .abandoned
                .fetch_add(report.abandoned, Ordering::Relaxed);
            NotificationMetrics::record_abandoned(report.abandoned);
            tracing::warn!(
                abandoned = report.abandoned,
                "Dropped undelivered notifications at shutdown"
            );
        }

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            drained = report.drained,
            abandoned = report.abandoned,
            "Notification consumer stopped"
        );
        report
    }

    async fn drain(
        &mut self,
        deliverer: &dyn Deliver,
        drain_timeout: Duration,
        report: &mut ConsumerReport,
    ) {
        let deadline = tokio::time::Instant::now() + drain_timeout;
        tracing::info!(
            backlog = self.stats.pending(),
            timeout_ms = drain_timeout.as_millis() as u64,
            "Draining notification backlog"
        );

        // An in-flight delivery is never cut short; the deadline only stops
        // taking new messages.
        loop {
            let message = match tokio::time::timeout_at(deadline, self.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Drain timeout reached");
                    break;
                }
            };
            self.dispatch(deliverer, &message, report).await;
            report.drained += 1;
        }
    }

    async fn dispatch(
        &self,
        deliverer: &dyn Deliver,
        message: &NotificationMessage,
        report: &mut ConsumerReport,
    ) {
        let start = Instant::now();
        let result = deliverer.deliver(message).await;
        let success = result.is_ok();
        NotificationMetrics::record_delivery(start.elapsed().as_secs_f64(), success);

        if success {
            report.delivered += 1;
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            report.failed += 1;
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use tokio_test::{assert_pending, assert_ready_ok};

    use super::*;
    use crate::notification::{DeliveryError, NotificationKind};
    use crate::record::{NewRecord, Record};

    fn message(id: &str) -> NotificationMessage {
        let record = Record::new(id.to_string(), NewRecord::default(), Utc::now());
        NotificationMessage::new("http://hooks.local", NotificationKind::Add, Arc::new(record))
    }

    #[derive(Default)]
    struct CollectingDeliverer {
        seen: Mutex<Vec<String>>,
        fail_ids: Vec<String>,
    }

    impl CollectingDeliverer {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Deliver for CollectingDeliverer {
        async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
            let id = message.record().id.clone();
            self.seen.lock().unwrap().push(id.clone());
            if self.fail_ids.contains(&id) {
                return Err(DeliveryError::Status {
                    url: message.url(),
                    status: 503,
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submit_blocks_when_full() {
        let (queue, mut consumer) = notification_queue(1);

        queue.submit(message("m1")).await.unwrap();

        let mut second = tokio_test::task::spawn(queue.submit(message("m2")));
        assert_pending!(second.poll());

        let first = consumer.recv().await.unwrap();
        assert_eq!(first.record().id, "m1");

        assert!(second.is_woken());
        assert_ready_ok!(second.poll());
        drop(second);

        assert_eq!(consumer.recv().await.unwrap().record().id, "m2");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let (queue, _consumer) = notification_queue(0);
        assert_eq!(queue.capacity(), 1);
        queue.submit(message("m1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_consumer_delivers_in_fifo_order() {
        let (queue, consumer) = notification_queue(16);
        let deliverer = Arc::new(CollectingDeliverer {
            fail_ids: vec!["m2".to_string()],
            ..Default::default()
        });

        for i in 1..=5 {
            queue.submit(message(&format!("m{}", i))).await.unwrap();
        }

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = consumer.spawn(deliverer.clone(), shutdown_rx, Duration::ZERO);

        // Dropping the last producer lets the consumer finish the buffer
        drop(queue);
        let report = handle.await.unwrap();

        assert_eq!(deliverer.seen(), vec!["m1", "m2", "m3", "m4", "m5"]);
        assert_eq!(report.delivered, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.abandoned, 0);
    }

    /// Holds the delivery of `m1` until released
    #[derive(Default)]
    struct StallingDeliverer {
        seen: Mutex<Vec<String>>,
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl Deliver for StallingDeliverer {
        async fn deliver(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
            let id = message.record().id.clone();
            self.seen.lock().unwrap().push(id.clone());
            if id == "m1" {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_delivery_blocks_later_messages() {
        let (queue, consumer) = notification_queue(4);
        let deliverer = Arc::new(StallingDeliverer::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = consumer.spawn(deliverer.clone(), shutdown_rx, Duration::ZERO);

        queue.submit(message("m1")).await.unwrap();
        queue.submit(message("m2")).await.unwrap();

        deliverer.started.notified().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*deliverer.seen.lock().unwrap(), vec!["m1"]);
        assert_eq!(queue.stats().pending, 1);

        deliverer.release.notify_one();
        drop(queue);
        let report = handle.await.unwrap();

        assert_eq!(*deliverer.seen.lock().unwrap(), vec!["m1", "m2"]);
        assert_eq!(report.delivered, 2);
    }

    #[tokio::test]
    async fn test_stop_abandons_backlog_and_closes_queue() {
        let (queue, consumer) = notification_queue(8);
        for i in 1..=3 {
            queue.submit(message(&format!("m{}", i))).await.unwrap();
        }

        let deliverer = Arc::new(CollectingDeliverer::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        // Signal before the consumer runs, so the stop is observed first
        shutdown_tx.send(()).unwrap();

        let report = consumer
            .run(deliverer.clone(), shutdown_rx, Duration::ZERO)
            .await;

        assert!(deliverer.seen().is_empty());
        assert_eq!(report.abandoned, 3);
        assert_eq!(queue.stats().abandoned, 3);
        assert_eq!(queue.stats().pending, 0);

        assert!(queue.is_closed());
        assert_eq!(queue.submit(message("late")).await, Err(QueueError::Closed));
        assert_eq!(queue.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_stop_with_drain_timeout_delivers_backlog() {
        let (queue, consumer) = notification_queue(8);
        for i in 1..=3 {
            queue.submit(message(&format!("m{}", i))).await.unwrap();
        }

        let deliverer = Arc::new(CollectingDeliverer::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();

        let report = consumer
            .run(deliverer.clone(), shutdown_rx, Duration::from_secs(5))
            .await;

        assert_eq!(deliverer.seen(), vec!["m1", "m2", "m3"]);
        assert_eq!(report.drained, 3);
        assert_eq!(report.delivered, 3);
        assert_eq!(report.abandoned, 0);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_consumer() {
        let (queue, consumer) = notification_queue(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let handle = consumer.spawn(
            Arc::new(CollectingDeliverer::default()),
            shutdown_rx,
            Duration::ZERO,
        );

        drop(shutdown_tx);
        let report = handle.await.unwrap();
        assert_eq!(report, ConsumerReport::default());
        assert!(queue.is_closed());
    }
}
