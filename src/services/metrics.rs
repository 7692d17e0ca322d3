//! Prometheus metrics for balance-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Consumption postings by outcome (ok, rejected).
pub static CONSUMPTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "balance_consumptions_total",
        "Total number of consumption postings",
        &["status"] // ok, rejected - not tenant_id to avoid cardinality explosion
    )
    .expect("Failed to register consumptions_total")
});

/// Reversals by outcome.
pub static REVERSALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "balance_reversals_total",
        "Total number of consumption reversals",
        &["status"]
    )
    .expect("Failed to register reversals_total")
});

/// Modality allocation edits by outcome.
pub static ALLOCATION_EDITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "balance_allocation_edits_total",
        "Total number of modality allocation edits",
        &["status"]
    )
    .expect("Failed to register allocation_edits_total")
});

/// Order splits by fulfillment outcome (full, partial).
pub static SPLITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "balance_splits_total",
        "Total number of order quantity splits",
        &["outcome"]
    )
    .expect("Failed to register splits_total")
});

/// Store operation duration histogram.
pub static STORE_OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "balance_store_op_duration_seconds",
        "Balance store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register store_op_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&CONSUMPTIONS_TOTAL);
    Lazy::force(&REVERSALS_TOTAL);
    Lazy::force(&ALLOCATION_EDITS_TOTAL);
    Lazy::force(&SPLITS_TOTAL);
    Lazy::force(&STORE_OP_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
