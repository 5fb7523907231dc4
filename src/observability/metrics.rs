//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lbc_events_applied_total` (counter): registry events applied, by kind
//! - `lbc_decode_errors_total` (counter): skipped malformed events, by source
//! - `lbc_renders_total` (counter): render cycles, by outcome
//! - `lbc_reloads_total` (counter): proxy reload invocations, by outcome
//! - `lbc_resyncs_total` (counter): full resyncs, by outcome
//! - `lbc_watch_restarts_total` (counter): supervised restarts, by task
//! - `lbc_services` / `lbc_certificates` (gauge): size of the last rendered snapshot

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_event_applied(kind: &'static str) {
    metrics::counter!("lbc_events_applied_total", "kind" => kind).increment(1);
}

pub fn record_decode_error(source: &'static str) {
    metrics::counter!("lbc_decode_errors_total", "source" => source).increment(1);
}

pub fn record_render(outcome: &'static str) {
    metrics::counter!("lbc_renders_total", "outcome" => outcome).increment(1);
}

pub fn record_reload(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("lbc_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_resync(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("lbc_resyncs_total", "outcome" => outcome).increment(1);
}

pub fn record_restart(task: &str) {
    metrics::counter!("lbc_watch_restarts_total", "task" => task.to_string()).increment(1);
}

pub fn record_snapshot_size(services: usize, certificates: usize) {
    metrics::gauge!("lbc_services").set(services as f64);
    metrics::gauge!("lbc_certificates").set(certificates as f64);
}
