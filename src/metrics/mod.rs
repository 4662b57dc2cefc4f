//! Prometheus metrics for the record service.
//!
//! - Record operation metrics (by operation and outcome)
//! - Notification pipeline metrics (submitted, delivered, failed, abandoned)
//! - Queue depth and delivery latency

mod helpers;

pub use helpers::{encode_metrics, NotificationMetrics, RecordMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "records";

lazy_static! {
    // ============================================================================
    // Record Metrics
    // ============================================================================

    /// Record store operations by operation and outcome
    pub static ref RECORD_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_operations_total", METRIC_PREFIX),
        "Total record store operations",
        &["operation", "outcome"]
    ).unwrap();

    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Notifications accepted by the queue, by kind
    pub static ref NOTIFICATIONS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_submitted_total", METRIC_PREFIX),
        "Total notifications submitted to the queue",
        &["kind"]
    ).unwrap();

    /// Notifications the queue refused because the consumer had stopped
    pub static ref NOTIFICATIONS_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_rejected_total", METRIC_PREFIX),
        "Total notifications rejected by a closed queue"
    ).unwrap();

    /// Webhook calls answered with a 2xx status
    pub static ref NOTIFICATIONS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_delivered_total", METRIC_PREFIX),
        "Total notifications delivered successfully"
    ).unwrap();

    /// Webhook calls that failed (transport error or non-2xx status)
    pub static ref NOTIFICATIONS_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_failed_total", METRIC_PREFIX),
        "Total notification delivery failures"
    ).unwrap();

    /// Notifications still buffered when the consumer stopped
    pub static ref NOTIFICATIONS_ABANDONED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_abandoned_total", METRIC_PREFIX),
        "Total notifications dropped at shutdown"
    ).unwrap();

    /// Messages currently waiting in the queue
    pub static ref NOTIFICATION_QUEUE_DEPTH: IntGauge = register_int_gauge!(
        format!("{}_notification_queue_depth", METRIC_PREFIX),
        "Number of notifications waiting for delivery"
    ).unwrap();

    /// Duration of a single webhook call
    pub static ref DELIVERY_LATENCY: Histogram = register_histogram!(
        format!("{}_delivery_latency_seconds", METRIC_PREFIX),
        "Webhook delivery latency in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).unwrap();
}
