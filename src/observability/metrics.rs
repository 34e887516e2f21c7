//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ssp_requests_total` (counter): HTTP requests by method and status
//! - `ssp_request_duration_seconds` (histogram): dispatch latency
//! - `ssp_backend_outcomes_total` (counter): back-end outcomes by kind
//! - `ssp_coap_retransmissions_total` (counter): CON retransmissions
//! - `ssp_registered_services` (gauge): proxy URIs in the registry
//! - `ssp_cached_graphs` (gauge): named graphs held by the cache
//!
//! Recording is a no-op until an exporter is installed.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "ssp_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("ssp_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_backend_outcome(kind: &'static str) {
    metrics::counter!("ssp_backend_outcomes_total", "kind" => kind).increment(1);
}

pub fn record_retransmission() {
    metrics::counter!("ssp_coap_retransmissions_total").increment(1);
}

pub fn set_registered_services(count: usize) {
    metrics::gauge!("ssp_registered_services").set(count as f64);
}

pub fn set_cached_graphs(count: usize) {
    metrics::gauge!("ssp_cached_graphs").set(count as f64);
}
