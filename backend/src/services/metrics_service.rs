//! Prometheus metrics collection and HTTP request instrumentation.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};

use crate::error::{AppError, Result};

/// Install the global Prometheus recorder and return the handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(format!("failed to install Prometheus recorder: {e}")))
}

/// Handle to a recorder that is not installed globally. Renders an empty page.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Axum middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let normalized = normalize_path(request.uri().path());

    let start = Instant::now();
    counter!("lpr_http_requests_total", "method" => method.clone(), "path" => normalized.clone())
        .increment(1);
    gauge!("lpr_http_requests_in_flight", "method" => method.clone(), "path" => normalized.clone())
        .increment(1.0);

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    histogram!("lpr_http_request_duration_seconds", "method" => method.clone(), "path" => normalized.clone(), "status" => status.clone()).record(duration);
    counter!("lpr_http_responses_total", "method" => method.clone(), "path" => normalized.clone(), "status" => status).increment(1);
    gauge!("lpr_http_requests_in_flight", "method" => method, "path" => normalized).decrement(1.0);

    response
}

/// Normalize URL paths to reduce label cardinality.
/// Replaces numeric ids and the segment following `sites` with placeholders.
fn normalize_path(path: &str) -> String {
    let mut previous: &str = "";
    let normalized: Vec<String> = path
        .split('/')
        .map(|seg| {
            let out = if previous == "sites" && !seg.is_empty() {
                ":site_code".to_string()
            } else if !seg.is_empty() && seg.parse::<i64>().is_ok() {
                ":id".to_string()
            } else {
                seg.to_string()
            };
            previous = seg;
            out
        })
        .collect();
    normalized.join("/")
}

/// Record the start of a whitelist sync run.
pub fn record_sync_started(total_batches: i32) {
    counter!("lpr_whitelist_sync_started_total").increment(1);
    histogram!("lpr_whitelist_sync_total_batches").record(total_batches as f64);
}

pub fn record_sync_completed() {
    counter!("lpr_whitelist_sync_completed_total").increment(1);
}

/// Record a failed sync run; `reason` is "timeout" or "cancelled".
pub fn record_sync_failed(reason: &str) {
    counter!("lpr_whitelist_sync_failed_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_command_enqueued(command_type: &str) {
    counter!("lpr_commands_enqueued_total", "type" => command_type.to_string()).increment(1);
}

pub fn record_command_delivered(command_type: &str) {
    counter!("lpr_commands_delivered_total", "type" => command_type.to_string()).increment(1);
}

/// Record a command marked processed without being delivered.
pub fn record_command_dropped(command_type: &str) {
    counter!("lpr_commands_dropped_total", "type" => command_type.to_string()).increment(1);
}

/// Record an entry decision.
pub fn record_entry_decision(allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!("lpr_entry_decisions_total", "outcome" => outcome.to_string()).increment(1);
}
