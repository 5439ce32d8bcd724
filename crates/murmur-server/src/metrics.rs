//! Metrics collection and export for Murmur.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "murmur_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "murmur_connections_active";
    pub const ADMISSIONS_REJECTED_TOTAL: &str = "murmur_admissions_rejected_total";
    pub const FRAMES_TOTAL: &str = "murmur_frames_total";
    pub const FRAMES_BYTES: &str = "murmur_frames_bytes";
    pub const FRAMES_DISCARDED_TOTAL: &str = "murmur_frames_discarded_total";
    pub const PUBLISHES_TOTAL: &str = "murmur_publishes_total";
    pub const PUBLISH_FAILURES_TOTAL: &str = "murmur_publish_failures_total";
    pub const FRAME_LATENCY_SECONDS: &str = "murmur_frame_latency_seconds";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of upgraded connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of streaming connections"
    );
    metrics::describe_counter!(
        names::ADMISSIONS_REJECTED_TOTAL,
        "Connection attempts rejected before upgrade, by reason"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of inbound frames");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of inbound frames");
    metrics::describe_counter!(
        names::FRAMES_DISCARDED_TOTAL,
        "Inbound frames dropped because they failed to decode"
    );
    metrics::describe_counter!(names::PUBLISHES_TOTAL, "Records handed to the bus, by topic");
    metrics::describe_counter!(
        names::PUBLISH_FAILURES_TOTAL,
        "Records lost because the bus rejected them, by topic"
    );
    metrics::describe_histogram!(
        names::FRAME_LATENCY_SECONDS,
        "Time from frame receipt to both records handed to the bus"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new streaming connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a rejected connection attempt.
pub fn record_rejection(reason: &'static str) {
    counter!(names::ADMISSIONS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// Record an inbound frame.
pub fn record_frame(bytes: usize) {
    counter!(names::FRAMES_TOTAL).increment(1);
    counter!(names::FRAMES_BYTES).increment(bytes as u64);
}

/// Record a discarded frame.
pub fn record_discarded_frame() {
    counter!(names::FRAMES_DISCARDED_TOTAL).increment(1);
}

/// Record a successful hand-off to the bus.
pub fn record_publish(topic: &str) {
    counter!(names::PUBLISHES_TOTAL, "topic" => topic.to_string()).increment(1);
}

/// Record a lost record.
pub fn record_publish_failure(topic: &str) {
    counter!(names::PUBLISH_FAILURES_TOTAL, "topic" => topic.to_string()).increment(1);
}

/// Record frame processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::FRAME_LATENCY_SECONDS).record(seconds);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // No recorder installed; must not panic
        let _guard = ConnectionMetricsGuard::new();
        record_rejection("forbidden");
        record_publish_failure("messages");
    }
}
