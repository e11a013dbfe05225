//! Shared fixtures for runner integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use guardload_core::{FatigueConfig, StepConfig, TargetConfig, TestPlan, TestRequest, TestType};
use guardload_service::{IssueError, LoadRunner, RequestIssuer, RunnerSettings};
use guardload_storage::{HistoryStore, MemoryHistoryStore};

/// Issuer that sleeps for a fixed latency on the tokio clock.
pub struct StubIssuer {
    latency: Duration,
    fail_every: Option<u64>,
    panic_on: Option<u64>,
    calls: AtomicU64,
}

impl StubIssuer {
    pub fn ok(latency_ms: u64) -> Self {
        Self {
            latency: Duration::from_millis(latency_ms),
            fail_every: None,
            panic_on: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Every `n`-th call returns HTTP 500.
    pub fn failing_every(latency_ms: u64, n: u64) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::ok(latency_ms)
        }
    }

    /// The `n`-th call panics.
    pub fn panicking_on(latency_ms: u64, n: u64) -> Self {
        Self {
            panic_on: Some(n),
            ..Self::ok(latency_ms)
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestIssuer for StubIssuer {
    async fn issue(&self, _target: &TargetConfig) -> Result<Bytes, IssueError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;

        if self.panic_on == Some(n) {
            panic!("stub issuer exploded on call {}", n);
        }
        if matches!(self.fail_every, Some(every) if n % every == 0) {
            return Err(IssueError::Status(500));
        }
        Ok(Bytes::from_static(br#"{"final_decision":{"score":0}}"#))
    }
}

pub struct Harness {
    pub runner: Arc<LoadRunner>,
    pub store: Arc<MemoryHistoryStore>,
    pub issuer: Arc<StubIssuer>,
}

pub fn harness(issuer: StubIssuer) -> Harness {
    harness_with(issuer, RunnerSettings::default())
}

pub fn harness_with(issuer: StubIssuer, settings: RunnerSettings) -> Harness {
    let issuer = Arc::new(issuer);
    let store = Arc::new(MemoryHistoryStore::new());
    let runner = Arc::new(LoadRunner::new(
        issuer.clone(),
        store.clone() as Arc<dyn HistoryStore>,
        settings,
    ));

    Harness {
        runner,
        store,
        issuer,
    }
}

pub fn target() -> TargetConfig {
    TargetConfig::new("app-perf", "how do I reset my password?")
}

pub fn fatigue_plan(concurrency: u32, duration_secs: u64) -> TestPlan {
    TestRequest {
        test_type: TestType::Fatigue,
        target_config: target(),
        step_config: None,
        fatigue_config: Some(FatigueConfig {
            concurrency,
            duration: duration_secs,
        }),
    }
    .into_plan()
    .unwrap()
}

pub fn step_plan(initial_users: u32, step_size: u32, step_duration: u64, max_users: u32) -> TestPlan {
    TestRequest {
        test_type: TestType::Step,
        target_config: target(),
        step_config: Some(StepConfig {
            initial_users,
            step_size,
            step_duration,
            max_users,
        }),
        fatigue_config: None,
    }
    .into_plan()
    .unwrap()
}
