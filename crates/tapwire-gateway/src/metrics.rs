//! Prometheus metrics for tapwire-gateway.
//!
//! Tracks recorded traffic, upstream health and control-plane activity.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};

lazy_static! {
    /// Traffic records appended to the store
    pub static ref RECORDS_TOTAL: CounterVec = register_counter_vec!(
        "tapwire_records_total",
        "Total number of traffic records captured",
        &["direction"]  // direction: outgoing|incoming
    )
    .unwrap();

    /// Upstream transport failures (surfaced to the client as 502)
    pub static ref UPSTREAM_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "tapwire_upstream_errors_total",
        "Total number of upstream requests that failed at the transport level"
    )
    .unwrap();

    /// Recording failures swallowed by the interceptor
    pub static ref SINK_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "tapwire_sink_failures_total",
        "Total number of traffic records that could not be stored"
    )
    .unwrap();

    /// Successful resets
    pub static ref RESETS_TOTAL: IntCounter = register_int_counter!(
        "tapwire_resets_total",
        "Total number of log store resets"
    )
    .unwrap();

    /// Records currently held by the store
    pub static ref STORE_SIZE: IntGauge = register_int_gauge!(
        "tapwire_store_size",
        "Number of traffic records currently retained"
    )
    .unwrap();

    /// Upstream round trip, including body collection
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "tapwire_upstream_request_duration_ms",
        "Duration of proxied upstream requests in milliseconds",
        &["method", "status"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_traffic(direction: &str) {
    RECORDS_TOTAL.with_label_values(&[direction]).inc();
}

pub fn record_upstream_error() {
    UPSTREAM_ERRORS_TOTAL.inc();
}

pub fn record_sink_failure() {
    SINK_FAILURES_TOTAL.inc();
}

pub fn record_reset() {
    RESETS_TOTAL.inc();
}

pub fn set_store_size(size: usize) {
    STORE_SIZE.set(size as i64);
}

pub fn record_upstream_duration(method: &str, status: u16, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, &status.to_string()])
        .observe(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_traffic("outgoing");
        record_traffic("incoming");

        let metrics = collect_metrics();
        assert!(metrics.contains("tapwire_records_total"));
    }

    #[test]
    fn test_store_size_gauge() {
        set_store_size(17);
        assert_eq!(STORE_SIZE.get(), 17);
        assert!(collect_metrics().contains("tapwire_store_size"));
    }

    #[test]
    fn test_counters_increase() {
        let before = RESETS_TOTAL.get();
        record_reset();
        assert!(RESETS_TOTAL.get() > before);

        let before = UPSTREAM_ERRORS_TOTAL.get();
        record_upstream_error();
        assert!(UPSTREAM_ERRORS_TOTAL.get() > before);
    }

    #[test]
    fn test_record_upstream_duration() {
        record_upstream_duration("GET", 200, 12.5);
        record_upstream_duration("POST", 502, 3.0);
        assert!(collect_metrics().contains("tapwire_upstream_request_duration_ms"));
    }
}
