//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): responses by status
//! - `gate_request_duration_seconds` (histogram): time spent in the gateway
//! - `gate_rejections_total` (counter): admission rejections by reason
//! - `gate_overload_lag_ms` (gauge): smoothed scheduler lag
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - Each worker exports on its own port (`metrics_address` + worker id),
//!   since workers share nothing in-process

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

pub fn record_request(status: u16, start_time: Instant) {
    let status = status.to_string();
    metrics::counter!("gate_requests_total", "status" => status.clone()).increment(1);
    metrics::histogram!("gate_request_duration_seconds", "status" => status)
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    metrics::counter!("gate_rejections_total", "reason" => reason).increment(1);
}

pub fn record_overload_lag(lag: Duration) {
    metrics::gauge!("gate_overload_lag_ms").set(lag.as_secs_f64() * 1000.0);
}

/// Exporter address for a worker.
pub fn worker_address(base: SocketAddr, worker_id: usize) -> SocketAddr {
    let port = base.port().saturating_add(worker_id as u16);
    SocketAddr::new(base.ip(), port)
}

/// Install the Prometheus exporter. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_address_offsets_port() {
        let base: SocketAddr = "127.0.0.1:9090".parse().unwrap();
        assert_eq!(worker_address(base, 0).port(), 9090);
        assert_eq!(worker_address(base, 3).port(), 9093);
    }

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_request(200, Instant::now());
        record_rejection("rate_limited");
        record_overload_lag(Duration::from_millis(3));
    }
}
