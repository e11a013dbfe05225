//! Heuristic post-run scoring.
//!
//! Starts from 100 and deducts points for errors, slow tails and latency
//! spikes. Step tests additionally get a throughput-ceiling check.

use serde::{Deserialize, Serialize};

use crate::history::{FinalStats, HistoryPoint};
use crate::request::TestType;
use crate::stats::round2;

const ERROR_RATE_HIGH_PCT: f64 = 1.0;
const ERROR_HIGH_PENALTY: i32 = 40;
const ERROR_ANY_PENALTY: i32 = 10;

const P99_CRITICAL_MS: f64 = 2000.0;
const P99_WARN_MS: f64 = 1000.0;
const P99_CRITICAL_PENALTY: i32 = 30;
const P99_WARN_PENALTY: i32 = 10;

const SPIKE_FLOOR_MS: f64 = 50.0;
const SPIKE_PENALTY: i32 = 5;
const MAX_PENALISED_SPIKES: usize = 4;

/// Fraction of the series inspected by the throughput-ceiling check.
const TAIL_FRACTION: f64 = 0.2;
/// RPS below this is too low to call a ceiling.
const CEILING_MIN_RPS: f64 = 10.0;

/// Score, summary and advice derived from a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub score: u8,
    pub conclusion: String,
    pub suggestions: Vec<String>,
}

/// Analyze a finished run.
pub fn analyze(stats: &FinalStats, history: &[HistoryPoint], test_type: TestType) -> PerformanceAnalysis {
    let mut score: i32 = 100;
    let mut suggestions = Vec::new();

    let error_rate = stats.error_rate_pct();
    if error_rate > ERROR_RATE_HIGH_PCT {
        score -= ERROR_HIGH_PENALTY;
        suggestions.push(format!(
            "Error rate {:.2}% exceeds {:.0}%. Check guardrail service logs for timeouts and rejected requests, and review upstream dependency capacity.",
            error_rate, ERROR_RATE_HIGH_PCT
        ));
    } else if error_rate > 0.0 {
        score -= ERROR_ANY_PENALTY;
        suggestions.push(format!(
            "{} request(s) failed ({:.2}%). Inspect the failures before raising load further.",
            stats.error_requests, error_rate
        ));
    }

    let p99s: Vec<f64> = history.iter().map(|p| p.p99_latency_ms).collect();
    let max_p99 = p99s.iter().copied().fold(0.0_f64, f64::max);
    let avg_p99 = if p99s.is_empty() {
        0.0
    } else {
        p99s.iter().sum::<f64>() / p99s.len() as f64
    };

    if max_p99 > P99_CRITICAL_MS {
        score -= P99_CRITICAL_PENALTY;
        suggestions.push(format!(
            "Peak P99 latency {:.0}ms exceeds {:.0}ms. Profile slow rule evaluation paths and consider caching keyword/rule lookups.",
            max_p99, P99_CRITICAL_MS
        ));
    } else if max_p99 > P99_WARN_MS {
        score -= P99_WARN_PENALTY;
        suggestions.push(format!(
            "Peak P99 latency {:.0}ms exceeds {:.0}ms. Tail latency deserves a closer look.",
            max_p99, P99_WARN_MS
        ));
    }

    let spike_threshold = (2.0 * avg_p99).max(SPIKE_FLOOR_MS);
    let spikes = p99s.iter().filter(|v| **v > spike_threshold).count();
    if spikes > 0 {
        score -= SPIKE_PENALTY * spikes.min(MAX_PENALISED_SPIKES) as i32;
        suggestions.push(format!(
            "Detected {} latency spike(s) above {:.0}ms. Look for GC pauses, connection pool exhaustion or periodic background jobs.",
            spikes, spike_threshold
        ));
    }

    if test_type == TestType::Step {
        if let Some(msg) = throughput_ceiling(history) {
            suggestions.push(msg);
        }
    }

    let score = score.clamp(0, 100) as u8;
    if score == 100 {
        suggestions.push(
            "System performed well: no errors, stable latency and no spikes under this load."
                .to_string(),
        );
    }

    let peak_users = history.iter().map(|p| p.concurrent_users).max().unwrap_or(0);
    let peak_rps = history.iter().map(|p| p.rps).fold(0.0_f64, f64::max);
    let conclusion = format!(
        "Peak of {} concurrent users at {:.2} RPS. P99 latency peaked at {:.2}ms (average {:.2}ms). {} requests sent, {} failed.",
        peak_users,
        peak_rps,
        max_p99,
        round2(avg_p99),
        stats.total_requests,
        stats.error_requests
    );

    PerformanceAnalysis {
        score,
        conclusion,
        suggestions,
    }
}

/// Users kept growing at the end of the run but RPS did not follow.
fn throughput_ceiling(history: &[HistoryPoint]) -> Option<String> {
    if history.len() < 2 {
        return None;
    }

    let tail_len = ((history.len() as f64 * TAIL_FRACTION).ceil() as usize).clamp(2, history.len());
    let tail = &history[history.len() - tail_len..];
    let first = tail.first()?;
    let last = tail.last()?;

    let users_grew = last.concurrent_users > first.concurrent_users;
    let rps_flat = last.rps <= first.rps;

    if users_grew && rps_flat && first.rps > CEILING_MIN_RPS {
        Some(format!(
            "Throughput plateaued near {:.1} RPS while users grew from {} to {}. The service has likely hit a capacity ceiling; scale out or optimise the hot path.",
            first.rps, first.concurrent_users, last.concurrent_users
        ))
    } else {
        None
    }
}
