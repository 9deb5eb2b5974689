//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): calls by kind, method, status
//! - `gateway_request_duration_seconds` (histogram): latency by kind
//! - `gateway_pool_leases` (gauge): outstanding leases per pool
//! - `gateway_stream_terminations_total` (counter): how chat streams ended
//! - `gateway_auth_redirects_total` (counter): requests bounced to login

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed relay call.
pub fn record_request(kind: &'static str, method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "kind" => kind,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn set_pool_leases(pool: &str, outstanding: usize) {
    metrics::gauge!("gateway_pool_leases", "pool" => pool.to_string()).set(outstanding as f64);
}

pub fn record_stream_termination(framing: &'static str, reason: &'static str) {
    metrics::counter!(
        "gateway_stream_terminations_total",
        "framing" => framing,
        "reason" => reason
    )
    .increment(1);
}

pub fn record_auth_redirect() {
    metrics::counter!("gateway_auth_redirects_total").increment(1);
}
