//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by kind, status
//! - `gateway_request_duration_seconds` (histogram): latency by kind
//! - `gateway_static_proxy_total` (counter): static forwards by outcome
//! - `gateway_sse_sessions_active` (gauge): open SSE sessions
//! - `gateway_sse_sessions_total` (counter): finished SSE sessions by outcome
//! - `gateway_aggregate_total` (counter): merged responses by completeness
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is optional and bound to its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(kind: &'static str, status: u16, start: Instant) {
    record_status(kind, status);
    histogram!("gateway_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

/// Count a request whose start time is unknown, e.g. one answered by the fallback.
pub fn record_status(kind: &'static str, status: u16) {
    counter!("gateway_requests_total", "kind" => kind, "status" => status.to_string()).increment(1);
}

pub fn record_static_proxy(outcome: &'static str) {
    counter!("gateway_static_proxy_total", "outcome" => outcome).increment(1);
}

pub fn sse_session_opened() {
    gauge!("gateway_sse_sessions_active").increment(1.0);
}

pub fn sse_session_closed(outcome: &'static str) {
    gauge!("gateway_sse_sessions_active").decrement(1.0);
    counter!("gateway_sse_sessions_total", "outcome" => outcome).increment(1);
}

pub fn record_aggregate(complete: bool) {
    let complete = if complete { "true" } else { "false" };
    counter!("gateway_aggregate_total", "complete" => complete).increment(1);
}
