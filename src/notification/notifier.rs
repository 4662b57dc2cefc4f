//! The producer side of the notification pipeline.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::queue::QueueError;
use super::types::NotificationMessage;

/// Accepts notification messages on behalf of a consumer.
///
/// The record store calls `submit` once per delivery target after each
/// committed mutation. Implementations may suspend the caller (backpressure)
/// but must keep the submission order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn submit(&self, message: NotificationMessage) -> Result<(), QueueError>;
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn submit(&self, _message: NotificationMessage) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Keeps every submitted message in memory, in submission order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<NotificationMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything submitted so far
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything submitted so far
    pub fn take(&self) -> Vec<NotificationMessage> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NotificationMessage>> {
        // A panicking test thread must not hide what was recorded
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn submit(&self, message: NotificationMessage) -> Result<(), QueueError> {
        self.lock().push(message);
        Ok(())
    }
}
