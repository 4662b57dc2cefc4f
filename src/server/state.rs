use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::notification::NotificationQueue;
use crate::record::RecordStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<RecordStore>,
    /// Producer handle, kept for queue statistics
    pub queue: NotificationQueue,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<RecordStore>, queue: NotificationQueue) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
            queue,
            start_time: Instant::now(),
        }
    }
}
