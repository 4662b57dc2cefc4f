//! Webhook notification pipeline.
//!
//! The record store builds one [`NotificationMessage`] per delivery target
//! for every committed mutation and submits it through a [`Notifier`]. The
//! production notifier is the bounded [`NotificationQueue`]; its single
//! [`QueueConsumer`] hands each message to a [`Deliver`] implementation.
//!
//! Delivery is at-most-once and in-memory only: failed calls are not retried
//! and the backlog does not survive a restart.

mod notifier;
mod queue;
mod sender;
mod types;

pub use notifier::{NoopNotifier, Notifier, RecordingNotifier};
pub use queue::{
    notification_queue, ConsumerReport, NotificationQueue, QueueConsumer, QueueError, QueueStats,
    QueueStatsSnapshot,
};
pub use sender::{create_deliverer, Deliver, DeliveryError, HttpDeliverySender, LogDeliverySender};
pub use types::{NotificationKind, NotificationMessage};
