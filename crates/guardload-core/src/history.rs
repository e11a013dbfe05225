//! Time series points and the persisted history record of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::PerformanceAnalysis;
use crate::ids::TestId;
use crate::request::{TestRequest, TestType};
use crate::stats::{round2, StatsWindow, WindowSample};

/// One snapshot of the run's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Unix epoch milliseconds; strictly increasing within one run
    pub timestamp: i64,
    pub rps: f64,
    pub error_rps: f64,
    /// Cumulative mean of successful requests, not windowed
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub concurrent_users: u32,
}

impl HistoryPoint {
    pub fn new(timestamp: i64, sample: &WindowSample, avg_latency_ms: f64, users: u32) -> Self {
        Self {
            timestamp,
            rps: sample.rps,
            error_rps: sample.error_rps,
            avg_latency_ms: round2(avg_latency_ms),
            p95_latency_ms: sample.p95_latency_ms,
            p99_latency_ms: sample.p99_latency_ms,
            concurrent_users: users,
        }
    }
}

/// Totals of a finished run (`stats.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStats {
    pub total_requests: u64,
    pub success_requests: u64,
    pub error_requests: u64,
    pub avg_latency_ms: f64,
    pub max_rps: f64,
    /// Peak windowed p95 over the run
    pub p95_latency_ms: f64,
    /// Peak windowed p99 over the run
    pub p99_latency_ms: f64,
}

impl FinalStats {
    pub fn from_run(stats: &StatsWindow, history: &[HistoryPoint]) -> Self {
        let peak = |f: fn(&HistoryPoint) -> f64| history.iter().map(f).fold(0.0_f64, f64::max);

        Self {
            total_requests: stats.total,
            success_requests: stats.success,
            error_requests: stats.error,
            avg_latency_ms: round2(stats.avg_latency_ms()),
            max_rps: peak(|p| p.rps),
            p95_latency_ms: peak(|p| p.p95_latency_ms),
            p99_latency_ms: peak(|p| p.p99_latency_ms),
        }
    }

    /// Error rate in percent.
    pub fn error_rate_pct(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.error_requests as f64 / self.total_requests as f64 * 100.0
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Ran its full profile (or hit an internal error and was finalised).
    Completed,
    /// A stop signal arrived before the profile finished.
    Stopped,
}

/// Summary row of a run (`meta.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMeta {
    pub test_id: TestId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds between start and end
    pub duration: u64,
    pub test_type: TestType,
    pub app_id: String,
    pub status: RunStatus,
    /// Opaque caller identity that launched the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
}

/// Everything persisted about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestHistoryRecord {
    pub meta: HistoryMeta,
    pub config: TestRequest,
    pub stats: FinalStats,
    pub history: Vec<HistoryPoint>,
    #[serde(default)]
    pub analysis: Option<PerformanceAnalysis>,
}
