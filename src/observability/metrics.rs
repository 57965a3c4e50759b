//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by application, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_origin_connect_errors_total` (counter): by application, error kind
//! - `proxy_reloads_total` (counter): reload cycles by outcome
//! - `proxy_topology_generation` (gauge): live generation number

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Application label used when no routing object matched.
pub const UNROUTED: &str = "-";

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(application: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "proxy_requests_total",
        "application" => application.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "proxy_request_duration_seconds",
        "application" => application.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_connect_error(application: &str, kind: &'static str) {
    metrics::counter!(
        "proxy_origin_connect_errors_total",
        "application" => application.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("proxy_reloads_total", "outcome" => outcome).increment(1);
}

pub fn set_generation(generation: u64) {
    metrics::gauge!("proxy_topology_generation").set(generation as f64);
}
