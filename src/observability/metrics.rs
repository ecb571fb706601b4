//! Metrics collection and exposition.
//!
//! # Metrics
//! - `echo_requests_total` (counter): requests served, by endpoint
//! - `echo_decode_failures_total` (counter): bodies that could not be decoded, by kind
//! - `echo_history_writes_total` (counter): history writes, by outcome
//! - `echo_rate_limited_total` (counter): requests rejected by the rate limiter
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`. Must run inside a Tokio
/// runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_request(endpoint: &'static str) {
    metrics::counter!("echo_requests_total", "endpoint" => endpoint).increment(1);
}

pub fn record_decode_failure(kind: &'static str) {
    metrics::counter!("echo_decode_failures_total", "kind" => kind).increment(1);
}

pub fn record_history_write(outcome: &'static str) {
    metrics::counter!("echo_history_writes_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("echo_rate_limited_total").increment(1);
}
