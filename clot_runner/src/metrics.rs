//! Prometheus metrics for simulated tournament runs.
//!
//! Metrics are exposed in Prometheus text format when the runner is started
//! with a metrics address. Without an installed exporter every call below is
//! a no-op.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use clot_runner::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::cycles_total("swiss");
//! ```

use clot_engine::AdvanceReport;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// Cycle Metrics
// ============================================================================

/// Increment the advance cycle counter.
pub fn cycles_total(format: &str) {
    metrics::counter!("clot_cycles_total", "format" => format.to_string()).increment(1);
}

/// Record how long one advance cycle took in milliseconds.
pub fn cycle_duration_ms(format: &str, duration_ms: f64) {
    metrics::histogram!("clot_cycle_duration_ms", "format" => format.to_string())
        .record(duration_ms);
}

/// Increment the failed cycle counter.
pub fn advance_errors_total(class: &str) {
    metrics::counter!("clot_advance_errors_total", "class" => class.to_string()).increment(1);
}

// ============================================================================
// Match Metrics
// ============================================================================

/// Add the match counts of a cycle report, children included.
pub fn record_report(report: &AdvanceReport) {
    metrics::counter!("clot_matches_polled_total").increment(report.polled as u64);
    metrics::counter!("clot_matches_created_total").increment(report.created as u64);
    metrics::counter!("clot_matches_resolved_total").increment(report.resolved as u64);
    metrics::counter!("clot_matches_voided_total").increment(report.voided as u64);
    metrics::counter!("clot_matches_skipped_total").increment(report.skipped as u64);
    metrics::counter!("clot_matches_halted_total").increment(report.halted as u64);
    metrics::counter!("clot_matches_recreated_total").increment(report.recreated as u64);
    for child in &report.children {
        record_report(child);
    }
}

/// Set the number of games currently open on the host.
pub fn open_games(count: usize) {
    metrics::gauge!("clot_open_games").set(count as f64);
}

// ============================================================================
// Tournament Metrics
// ============================================================================

/// Increment the finished tournament counter.
pub fn tournaments_finished_total(format: &str) {
    metrics::counter!("clot_tournaments_finished_total", "format" => format.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter() {
        // No recorder is installed, so these must be no-ops
        cycles_total("swiss");
        cycle_duration_ms("swiss", 1.5);
        advance_errors_total("RecoverableRemote");
        open_games(3);
        tournaments_finished_total("swiss");

        let report = AdvanceReport {
            created: 2,
            children: vec![AdvanceReport {
                resolved: 1,
                ..AdvanceReport::default()
            }],
            ..AdvanceReport::default()
        };
        record_report(&report);
    }
}
