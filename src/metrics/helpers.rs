//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    DELIVERY_LATENCY, NOTIFICATIONS_ABANDONED_TOTAL, NOTIFICATIONS_DELIVERED_TOTAL,
    NOTIFICATIONS_FAILED_TOTAL, NOTIFICATIONS_REJECTED_TOTAL, NOTIFICATIONS_SUBMITTED_TOTAL,
    NOTIFICATION_QUEUE_DEPTH, RECORD_OPERATIONS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording record store metrics
pub struct RecordMetrics;

impl RecordMetrics {
    /// Record the outcome of a store operation
    pub fn record(operation: &str, outcome: &str) {
        RECORD_OPERATIONS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();
    }
}

/// Helper struct for recording notification pipeline metrics
pub struct NotificationMetrics;

impl NotificationMetrics {
    pub fn record_submitted(kind: &str) {
        NOTIFICATIONS_SUBMITTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_rejected() {
        NOTIFICATIONS_REJECTED_TOTAL.inc();
    }

    /// Record one finished webhook call
    pub fn record_delivery(latency_secs: f64, success: bool) {
        DELIVERY_LATENCY.observe(latency_secs);
        if success {
            NOTIFICATIONS_DELIVERED_TOTAL.inc();
        } else {
            NOTIFICATIONS_FAILED_TOTAL.inc();
        }
    }

    pub fn record_abandoned(count: u64) {
        NOTIFICATIONS_ABANDONED_TOTAL.inc_by(count);
    }

    pub fn set_queue_depth(depth: usize) {
        NOTIFICATION_QUEUE_DEPTH.set(depth as i64);
    }
}
