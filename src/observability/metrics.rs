//! Metrics collection and exposition.
//!
//! # Metrics
//! - `webhook_requests_total` (counter): deliveries by provider, outcome
//! - `webhook_request_duration_seconds` (histogram): pipeline latency by provider
//! - `webhook_rejections_total` (counter): rejections by reason code
//! - `rate_limited_total` (counter): denied tokens by scope (inbound, outbound)
//! - `replay_entries` (gauge): remembered fingerprints
//! - `replay_evictions_total` (counter): live fingerprints evicted at capacity
//! - `lock_events_total` (counter): lock acquire/contend/release/expire events
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests can call these freely.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// One finished webhook, accepted or rejected.
pub fn record_webhook(provider: &str, outcome: &'static str, start: Instant) {
    counter!(
        "webhook_requests_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("webhook_request_duration_seconds", "provider" => provider.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    counter!("webhook_rejections_total", "reason" => reason).increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_replay_entries(count: usize) {
    gauge!("replay_entries").set(count as f64);
}

pub fn record_replay_eviction() {
    counter!("replay_evictions_total").increment(1);
}

pub fn record_lock_event(event: &'static str) {
    counter!("lock_events_total", "event" => event).increment(1);
}
