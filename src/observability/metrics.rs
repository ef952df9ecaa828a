//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method and status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `rate_limited_total` (counter): requests refused by the rate limiter
//! - `injection_blocked_total` (counter): payloads refused by the operator pass
//! - `uploads_total` (counter): upload outcomes by label
//! - `static_files_served_total` (counter)
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so the
//! helpers are safe to call from tests.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("http_requests_total", "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("rate_limited_total").increment(1);
}

pub fn record_injection_blocked() {
    counter!("injection_blocked_total").increment(1);
}

pub fn record_upload(outcome: &'static str) {
    counter!("uploads_total", "outcome" => outcome).increment(1);
}

pub fn record_static_served() {
    counter!("static_files_served_total").increment(1);
}

/// Outermost middleware: one request/latency sample per response.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    record_request(&method, response.status().as_u16(), start);
    response
}
