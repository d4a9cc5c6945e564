//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_sessions_total` (counter): accepted client connections
//! - `proxy_active_sessions` (gauge): sessions currently running
//! - `proxy_tunnels_total` (counter): CONNECT tunnels established
//! - `proxy_forwards_total` (counter): requests forwarded upstream
//! - `proxy_upstream_connect_failures_total` (counter)
//! - `proxy_rejected_requests_total` (counter, label `reason`)
//! - `proxy_relayed_bytes_total` (counter, label `direction`)
//!
//! Updates go through the `metrics` facade and are no-ops until a recorder
//! is installed, so sessions can record unconditionally.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn session_opened() {
    counter!("proxy_sessions_total").increment(1);
    gauge!("proxy_active_sessions").increment(1.0);
}

pub fn session_closed() {
    gauge!("proxy_active_sessions").decrement(1.0);
}

pub fn tunnel_established() {
    counter!("proxy_tunnels_total").increment(1);
}

pub fn request_forwarded() {
    counter!("proxy_forwards_total").increment(1);
}

pub fn upstream_connect_failed() {
    counter!("proxy_upstream_connect_failures_total").increment(1);
}

pub fn request_rejected(reason: &'static str) {
    counter!("proxy_rejected_requests_total", "reason" => reason).increment(1);
}

pub fn bytes_relayed(client_to_upstream: u64, upstream_to_client: u64) {
    counter!("proxy_relayed_bytes_total", "direction" => "client_to_upstream")
        .increment(client_to_upstream);
    counter!("proxy_relayed_bytes_total", "direction" => "upstream_to_client")
        .increment(upstream_to_client);
}
