//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pipeline_requests_total` (counter): requests by method, status
//! - `pipeline_request_duration_seconds` (histogram): latency distribution
//! - `pipeline_filter_rejections_total` (counter): short-circuits by filter, status
//! - `pipeline_unmatched_routes_total` (counter): requests answered 404
//! - `pipeline_serialization_failures_total` (counter): encode errors by media type
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Prometheus exporter only when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("pipeline_requests_total", &labels).increment(1);
    histogram!("pipeline_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_filter_rejection(filter: &str, status: u16) {
    counter!(
        "pipeline_filter_rejections_total",
        "filter" => filter.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_unmatched() {
    counter!("pipeline_unmatched_routes_total").increment(1);
}

pub fn record_serialization_failure(media_type: &'static str) {
    counter!("pipeline_serialization_failures_total", "media_type" => media_type).increment(1);
}
