//! Live request counters and the rolling throughput/latency window.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Minimum window length before rates and percentiles are recomputed.
pub const MIN_WINDOW: Duration = Duration::from_secs(1);

/// Figures produced by one window roll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSample {
    /// Completed requests per second over the window
    pub rps: f64,
    /// Failed requests per second over the window
    pub error_rps: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

/// Counters mutated by workers and drained by the runner.
///
/// `latency_sum_ms` and `latency_count` only ever include successful
/// requests. The cumulative counters never decrease; only the `window_*`
/// fields are reset by [`StatsWindow::roll`].
#[derive(Debug, Clone)]
pub struct StatsWindow {
    pub total: u64,
    pub success: u64,
    pub error: u64,
    pub latency_sum_ms: f64,
    pub latency_count: u64,
    pub window_requests: u64,
    pub window_errors: u64,
    pub window_latencies: Vec<f64>,
    pub window_start: Instant,
}

impl StatsWindow {
    pub fn new(now: Instant) -> Self {
        Self {
            total: 0,
            success: 0,
            error: 0,
            latency_sum_ms: 0.0,
            latency_count: 0,
            window_requests: 0,
            window_errors: 0,
            window_latencies: Vec::new(),
            window_start: now,
        }
    }

    /// Record a successful request
    pub fn record_success(&mut self, latency_ms: f64) {
        self.total += 1;
        self.window_requests += 1;
        self.success += 1;
        self.latency_sum_ms += latency_ms;
        self.latency_count += 1;
        self.window_latencies.push(latency_ms);
    }

    /// Record a failed request. Its latency is deliberately dropped.
    pub fn record_failure(&mut self) {
        self.total += 1;
        self.window_requests += 1;
        self.error += 1;
        self.window_errors += 1;
    }

    /// Mean latency of successful requests over the whole run.
    pub fn avg_latency_ms(&self) -> f64 {
        if self.latency_count == 0 {
            return 0.0;
        }
        self.latency_sum_ms / self.latency_count as f64
    }

    /// Close the current window if it is at least [`MIN_WINDOW`] old.
    ///
    /// Returns `None` when the window is too young; callers keep reporting
    /// their previous sample in that case.
    pub fn roll(&mut self, now: Instant) -> Option<WindowSample> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < MIN_WINDOW {
            return None;
        }

        let secs = elapsed.as_secs_f64();
        let mut latencies = std::mem::take(&mut self.window_latencies);
        latencies.sort_unstable_by(|a, b| a.total_cmp(b));

        let sample = WindowSample {
            rps: round2(self.window_requests as f64 / secs),
            error_rps: round2(self.window_errors as f64 / secs),
            p95_latency_ms: round2(percentile_sorted(&latencies, 95.0)),
            p99_latency_ms: round2(percentile_sorted(&latencies, 99.0)),
        };

        self.window_requests = 0;
        self.window_errors = 0;
        self.window_start = now;

        Some(sample)
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `p` is in percent (0–100). Returns 0.0 for an empty slice.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    percentile_sorted(&sorted, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Round to two decimal places for reporting.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_latency_ignores_failures() {
        let mut stats = StatsWindow::new(Instant::now());
        stats.record_success(100.0);
        stats.record_success(200.0);
        stats.record_success(300.0);
        stats.record_failure();
        stats.record_failure();

        assert_eq!(stats.avg_latency_ms(), 200.0);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.success + stats.error, stats.total);
        assert_eq!(stats.window_latencies.len(), 3);
    }

    #[test]
    fn test_percentiles_interpolate() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();

        assert!((percentile(&samples, 95.0) - 95.05).abs() < 1e-9);
        assert!((percentile(&samples, 99.0) - 99.01).abs() < 1e-9);
        assert_eq!(percentile(&samples, 100.0), 100.0);
        assert_eq!(percentile(&samples, 0.0), 1.0);
    }

    #[test]
    fn test_percentile_edge_cases() {
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[42.0], 99.0), 42.0);
        // Unsorted input
        assert_eq!(percentile(&[30.0, 10.0, 20.0], 50.0), 20.0);
    }

    #[test]
    fn test_roll_waits_for_full_window() {
        let start = Instant::now();
        let mut stats = StatsWindow::new(start);
        stats.record_success(10.0);

        assert!(stats.roll(start + Duration::from_millis(500)).is_none());
        // Nothing was reset
        assert_eq!(stats.window_requests, 1);
        assert_eq!(stats.window_latencies.len(), 1);
    }

    #[test]
    fn test_roll_computes_and_resets() {
        let start = Instant::now();
        let mut stats = StatsWindow::new(start);
        for latency in [10.0, 20.0, 30.0, 40.0] {
            stats.record_success(latency);
        }
        stats.record_failure();
        stats.record_failure();

        let sample = stats.roll(start + Duration::from_secs(2)).unwrap();
        assert_eq!(sample.rps, 3.0);
        assert_eq!(sample.error_rps, 1.0);
        assert!(sample.p99_latency_ms >= sample.p95_latency_ms);
        assert!(sample.p95_latency_ms > 30.0);

        assert_eq!(stats.window_requests, 0);
        assert_eq!(stats.window_errors, 0);
        assert!(stats.window_latencies.is_empty());
        // Cumulative counters survive the roll
        assert_eq!(stats.total, 6);
        assert_eq!(stats.avg_latency_ms(), 25.0);
    }

    #[test]
    fn test_empty_window_reports_zero_latency() {
        let start = Instant::now();
        let mut stats = StatsWindow::new(start);
        stats.record_failure();

        let sample = stats.roll(start + MIN_WINDOW).unwrap();
        assert_eq!(sample.p95_latency_ms, 0.0);
        assert_eq!(sample.p99_latency_ms, 0.0);
        assert_eq!(sample.error_rps, 1.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }
}
