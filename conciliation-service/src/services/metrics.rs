//! Prometheus metrics for conciliation-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for document store round trips by operation.
pub static STORE_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "conciliation_store_call_duration_seconds",
        "Document store call duration in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register STORE_CALL_DURATION")
});

/// Counter for conciliation operations by operation, family and outcome.
pub static CONCILIATION_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "conciliation_operations_total",
        "Total number of conciliation operations",
        &["operation", "family", "status"]
    )
    .expect("Failed to register CONCILIATION_OPERATIONS")
});

/// Counter for group tags written or cleared.
pub static DOCUMENT_TAG_WRITES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "conciliation_document_tag_writes_total",
        "Total number of group tags written or cleared",
        &["family", "action"]
    )
    .expect("Failed to register DOCUMENT_TAG_WRITES")
});

/// Counter for payments found with allocations outside their group.
pub static UNSAFE_PAYMENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "conciliation_unsafe_payments_total",
        "Total number of unsafe payments detected during dissolution",
        &["family", "forced"]
    )
    .expect("Failed to register UNSAFE_PAYMENTS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "conciliation_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&STORE_CALL_DURATION);
    Lazy::force(&CONCILIATION_OPERATIONS);
    Lazy::force(&DOCUMENT_TAG_WRITES);
    Lazy::force(&UNSAFE_PAYMENTS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record the outcome of a conciliation operation.
pub fn record_operation(operation: &str, family: &str, status: &str) {
    CONCILIATION_OPERATIONS
        .with_label_values(&[operation, family, status])
        .inc();
}

/// Record group tags written (`tagged`) or cleared (`cleared`).
pub fn record_tag_writes(family: &str, action: &str, count: usize) {
    DOCUMENT_TAG_WRITES
        .with_label_values(&[family, action])
        .inc_by(count as f64);
}

/// Record unsafe payments found during a dissolution.
pub fn record_unsafe_payments(family: &str, forced: bool, count: usize) {
    UNSAFE_PAYMENTS
        .with_label_values(&[family, if forced { "true" } else { "false" }])
        .inc_by(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
