//! Prometheus metrics for the composite query engine
//!
//! Registered in the default registry on first use; expose them with
//! [`gather_metrics`].

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // === Counters ===

    /// Composite queries by panel type and outcome
    pub static ref COMPOSITE_QUERIES_TOTAL: CounterVec = register_counter_vec!(
        "kuba_compose_queries_total",
        "Composite queries evaluated",
        &["panel", "status"]
    ).expect("metric can be registered");

    /// Builder query evaluations against the store by outcome
    pub static ref STORE_EVALUATIONS_TOTAL: CounterVec = register_counter_vec!(
        "kuba_compose_store_evaluations_total",
        "Builder query evaluations issued to the store",
        &["status"]
    ).expect("metric can be registered");

    /// Formulas evaluated
    pub static ref FORMULAS_EVALUATED_TOTAL: Counter = register_counter!(
        "kuba_compose_formulas_evaluated_total",
        "Formula queries evaluated"
    ).expect("metric can be registered");

    // === Latency Histograms ===

    /// End-to-end request latency
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "kuba_compose_query_duration_seconds",
        "Composite query latency in seconds",
        &["panel"],
        vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).expect("metric can be registered");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a finished composite query
#[inline]
pub fn record_query(panel: &str, status: &str, duration_secs: f64) {
    COMPOSITE_QUERIES_TOTAL
        .with_label_values(&[panel, status])
        .inc();

    QUERY_DURATION
        .with_label_values(&[panel])
        .observe(duration_secs);
}

/// Record one store evaluation
#[inline]
pub fn record_store_evaluation(success: bool) {
    let status = if success { "success" } else { "error" };
    STORE_EVALUATIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Record one formula evaluation
#[inline]
pub fn record_formula() {
    FORMULAS_EVALUATED_TOTAL.inc();
}
