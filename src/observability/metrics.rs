//! Metrics collection and exposition.
//!
//! # Metrics
//! - `transformer_requests_total` (counter): requests by outcome
//!   (`passthrough`, `forwarded`, `rejected`)
//! - `transformer_flags_applied_total` (counter): applied transforms by flag
//! - `transformer_upstream_requests_total` (counter): forwarded requests by status
//!
//! # Design Decisions
//! - Recording is a no-op until [`init_metrics`] installs the exporter

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_outcome(outcome: &'static str) {
    metrics::counter!("transformer_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_flag(flag: &'static str) {
    metrics::counter!("transformer_flags_applied_total", "flag" => flag).increment(1);
}

pub fn record_upstream(status: u16) {
    metrics::counter!("transformer_upstream_requests_total", "status" => status.to_string())
        .increment(1);
}
