//! LoadRunner: owns the single active run of the process.
//!
//! A run moves through `Idle -> Running -> (Stopping) -> Idle`. The run slot
//! is claimed atomically and held until the record is persisted, so a new run
//! can never overlap the finalisation of the previous one.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use guardload_core::{
    analyze, CoreError, CoreResult, FinalStats, HistoryMeta, HistoryPoint, LoadProfile,
    RunStatus, StatsWindow, TargetConfig, TestHistoryRecord, TestId, TestPlan, TestRequest,
    TestType, WindowSample,
};
use guardload_storage::HistoryStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::RunnerSettings;
use crate::issuer::{probe, DryRunResult, RequestIssuer};
use crate::profile::{self, ProfileOutcome};
use crate::worker::RunContext;

/// Live view of the current (or last) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub test_id: Option<TestId>,
    pub test_type: Option<TestType>,
    /// Seconds since start; frozen once the run has ended
    pub duration: u64,
    pub current_users: u32,
    pub total_requests: u64,
    pub success_requests: u64,
    pub error_requests: u64,
    pub current_rps: f64,
    pub error_rps: f64,
    pub avg_latency: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Running,
    Stopping,
}

struct RunState {
    phase: RunPhase,
    test_id: Option<TestId>,
    request: Option<TestRequest>,
    operator: Option<String>,
    stopped: bool,
    started_at: DateTime<Utc>,
    start_instant: Instant,
    end_instant: Option<Instant>,
    stats: Arc<Mutex<StatsWindow>>,
    users: Arc<AtomicU32>,
    cancel: CancellationToken,
    last_sample: WindowSample,
    history: Vec<HistoryPoint>,
}

impl RunState {
    fn idle() -> Self {
        let now = Instant::now();
        Self {
            phase: RunPhase::Idle,
            test_id: None,
            request: None,
            operator: None,
            stopped: false,
            started_at: Utc::now(),
            start_instant: now,
            end_instant: None,
            stats: Arc::new(Mutex::new(StatsWindow::new(now))),
            users: Arc::new(AtomicU32::new(0)),
            cancel: CancellationToken::new(),
            last_sample: WindowSample::default(),
            history: Vec::new(),
        }
    }

    /// Wall-clock time of `instant`, derived from the run's monotonic clock.
    fn wall_time(&self, instant: Instant) -> DateTime<Utc> {
        let elapsed = instant.saturating_duration_since(self.start_instant);
        self.started_at + chrono::Duration::milliseconds(elapsed.as_millis() as i64)
    }

    /// Roll the window if it is old enough and append a point.
    fn sample(&mut self, now: Instant) {
        let rolled = self.stats.lock().roll(now);
        if let Some(sample) = rolled {
            self.last_sample = sample;
            self.push_point(now);
        }
    }

    fn push_point(&mut self, now: Instant) {
        let mut timestamp = self.wall_time(now).timestamp_millis();
        if let Some(last) = self.history.last() {
            if timestamp <= last.timestamp {
                timestamp = last.timestamp + 1;
            }
        }

        let avg = self.stats.lock().avg_latency_ms();
        let users = self.users.load(Ordering::SeqCst);
        self.history
            .push(HistoryPoint::new(timestamp, &self.last_sample, avg, users));
    }
}

/// A claimed run waiting to be driven.
struct ActiveRun {
    test_id: TestId,
    profile: LoadProfile,
    ctx: RunContext,
}

pub struct LoadRunner {
    issuer: Arc<dyn RequestIssuer>,
    store: Arc<dyn HistoryStore>,
    settings: RunnerSettings,
    /// Run slot, held from claim until the record is persisted
    active: AtomicBool,
    state: Mutex<RunState>,
    idle: Notify,
}

impl LoadRunner {
    pub fn new(
        issuer: Arc<dyn RequestIssuer>,
        store: Arc<dyn HistoryStore>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            issuer,
            store,
            settings,
            active: AtomicBool::new(false),
            state: Mutex::new(RunState::idle()),
            idle: Notify::new(),
        }
    }

    /// Whether a run is executing and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.state.lock().phase == RunPhase::Running
    }

    /// Whether the run slot is held, including while a stopped run finalises.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Send a single request to check the target is reachable.
    pub async fn dry_run(&self, target: &TargetConfig) -> CoreResult<DryRunResult> {
        if self.is_active() {
            return Err(CoreError::AlreadyRunning);
        }

        let result = probe(self.issuer.as_ref(), target).await;
        tracing::info!(
            app_id = %target.app_id,
            success = result.success,
            latency_ms = result.latency_ms,
            "dry run finished"
        );
        Ok(result)
    }

    /// Run `plan` to completion on the calling task.
    ///
    /// Returns `None` without doing anything if a run is already active.
    /// Dropping the future mid-run cancels the run and frees the slot without
    /// persisting a record.
    pub async fn start_test(&self, plan: TestPlan, operator: Option<String>) -> Option<TestId> {
        let run = match self.claim(plan, operator) {
            Ok(run) => run,
            Err(_) => {
                tracing::debug!("start ignored, a test is already active");
                return None;
            }
        };

        let test_id = run.test_id;
        self.drive(run).await;
        Some(test_id)
    }

    /// Claim the run slot and drive `plan` on a background task.
    pub fn launch(self: &Arc<Self>, plan: TestPlan, operator: Option<String>) -> CoreResult<TestId> {
        let run = self.claim(plan, operator)?;
        let test_id = run.test_id;

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.drive(run).await;
        });

        Ok(test_id)
    }

    /// Signal the active run to stop. Returns false if nothing was running.
    ///
    /// Does not wait for workers to drain.
    pub fn stop(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        if state.phase != RunPhase::Running {
            return false;
        }

        state.phase = RunPhase::Stopping;
        state.stopped = true;
        state.end_instant = Some(now);
        state.cancel.cancel();

        if let Some(test_id) = state.test_id {
            tracing::info!(%test_id, "stop signal sent");
        }
        true
    }

    pub fn get_status(&self) -> StatusSnapshot {
        let now = Instant::now();
        let mut state = self.state.lock();
        if state.phase != RunPhase::Idle {
            state.sample(now);
        }

        let duration = match state.test_id {
            Some(_) => state
                .end_instant
                .unwrap_or(now)
                .saturating_duration_since(state.start_instant)
                .as_secs(),
            None => 0,
        };

        let (total, success, error, avg) = {
            let stats = state.stats.lock();
            (stats.total, stats.success, stats.error, stats.avg_latency_ms())
        };

        let keep = self.settings.status_history_points;
        let skip = state.history.len().saturating_sub(keep);

        StatusSnapshot {
            is_running: state.phase == RunPhase::Running,
            test_id: state.test_id,
            test_type: state.request.as_ref().map(|r| r.test_type),
            duration,
            current_users: state.users.load(Ordering::SeqCst),
            total_requests: total,
            success_requests: success,
            error_requests: error,
            current_rps: state.last_sample.rps,
            error_rps: state.last_sample.error_rps,
            avg_latency: guardload_core::round2(avg),
            p95_latency: state.last_sample.p95_latency_ms,
            p99_latency: state.last_sample.p99_latency_ms,
            history: state.history[skip..].to_vec(),
        }
    }

    pub async fn get_history_list(&self) -> CoreResult<Vec<HistoryMeta>> {
        self.store.list().await
    }

    pub async fn get_history_detail(&self, test_id: TestId) -> CoreResult<TestHistoryRecord> {
        self.store.get(test_id).await
    }

    pub async fn delete_history(&self, test_id: TestId) -> CoreResult<()> {
        self.store.delete(test_id).await
    }

    /// Wait until the run slot is released.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.is_active() {
                return;
            }
            notified.await;
        }
    }

    /// Stop any active run and wait up to `timeout` for it to be persisted.
    pub async fn shutdown(&self, timeout: Duration) {
        self.stop();
        if tokio::time::timeout(timeout, self.wait_idle()).await.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "active test did not finalise before shutdown timeout"
            );
        }
    }

    fn claim(&self, plan: TestPlan, operator: Option<String>) -> CoreResult<ActiveRun> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CoreError::AlreadyRunning);
        }

        let test_id = TestId::new();
        let now = Instant::now();
        let TestPlan {
            target,
            profile,
            request,
        } = plan;

        let state = RunState {
            phase: RunPhase::Running,
            test_id: Some(test_id),
            request: Some(request),
            operator,
            stopped: false,
            started_at: Utc::now(),
            start_instant: now,
            end_instant: None,
            stats: Arc::new(Mutex::new(StatsWindow::new(now))),
            users: Arc::new(AtomicU32::new(0)),
            cancel: CancellationToken::new(),
            last_sample: WindowSample::default(),
            history: Vec::new(),
        };

        let ctx = RunContext {
            issuer: Arc::clone(&self.issuer),
            target: Arc::new(target),
            stats: Arc::clone(&state.stats),
            cancel: state.cancel.clone(),
            users: Arc::clone(&state.users),
            pause: self.settings.worker_pause,
        };

        tracing::info!(
            %test_id,
            test_type = %profile.test_type(),
            profile = %profile.description(),
            app_id = %ctx.target.app_id,
            operator = state.operator.as_deref().unwrap_or("-"),
            "performance test started"
        );

        *self.state.lock() = state;

        Ok(ActiveRun {
            test_id,
            profile,
            ctx,
        })
    }

    async fn drive(&self, run: ActiveRun) {
        let ActiveRun {
            test_id,
            profile,
            ctx,
        } = run;
        let guard = AbandonGuard {
            runner: self,
            test_id,
            armed: true,
        };

        let mut profile_task = tokio::spawn(profile::drive(
            profile,
            ctx,
            self.settings.ramp_up_fraction,
        ));

        let mut ticker = tokio::time::interval(self.settings.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let joined = loop {
            tokio::select! {
                res = &mut profile_task => break res,
                _ = ticker.tick() => self.sample_now(),
            }
        };

        let completed = matches!(joined, Ok(Ok(ProfileOutcome::Completed)));
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(%test_id, "load profile failed: {}", e),
            Err(e) => tracing::error!(%test_id, "load profile task aborted: {}", e),
        }

        self.finalize(test_id, completed).await;
        guard.disarm();
    }

    /// `completed` is true when the profile ran its full schedule; a stop that
    /// arrived after that point does not mark the run as stopped.
    async fn finalize(&self, test_id: TestId, completed: bool) {
        let record = {
            let now = Instant::now();
            let mut state = self.state.lock();
            state.cancel.cancel();

            let end = *state.end_instant.get_or_insert(now);
            // Final point: fresh window if one is due, otherwise carry forward
            let rolled = state.stats.lock().roll(now);
            if let Some(sample) = rolled {
                state.last_sample = sample;
            }
            state.push_point(now);

            state.phase = RunPhase::Idle;
            let record = self.build_record(&state, test_id, end, completed);
            state.users.store(0, Ordering::SeqCst);
            record
        };

        let Some(record) = record else {
            tracing::error!(%test_id, "run state lost its request, nothing persisted");
            self.release();
            return;
        };

        match self.store.save(&record).await {
            Ok(()) => tracing::info!(
                %test_id,
                status = ?record.meta.status,
                duration_secs = record.meta.duration,
                total_requests = record.stats.total_requests,
                error_requests = record.stats.error_requests,
                score = record.analysis.as_ref().map(|a| a.score),
                "performance test finished"
            ),
            Err(e) => tracing::error!(%test_id, "failed to persist test history: {}", e),
        }

        self.release();
    }

    fn build_record(
        &self,
        state: &RunState,
        test_id: TestId,
        end: Instant,
        completed: bool,
    ) -> Option<TestHistoryRecord> {
        let request = state.request.clone()?;

        let stats = {
            let window = state.stats.lock();
            FinalStats::from_run(&window, &state.history)
        };
        let analysis = analyze(&stats, &state.history, request.test_type);

        let meta = HistoryMeta {
            test_id,
            start_time: state.started_at,
            end_time: state.wall_time(end),
            duration: end.saturating_duration_since(state.start_instant).as_secs(),
            test_type: request.test_type,
            app_id: request.target_config.app_id.clone(),
            status: if state.stopped && !completed {
                RunStatus::Stopped
            } else {
                RunStatus::Completed
            },
            operator: state.operator.clone(),
        };

        Some(TestHistoryRecord {
            meta,
            config: request,
            stats,
            history: state.history.clone(),
            analysis: Some(analysis),
        })
    }

    fn sample_now(&self) {
        self.state.lock().sample(Instant::now());
    }

    /// Tear down a run whose driver went away before it was persisted.
    fn abandon(&self, test_id: TestId) {
        {
            let now = Instant::now();
            let mut state = self.state.lock();
            state.cancel.cancel();
            if state.end_instant.is_none() {
                state.end_instant = Some(now);
            }
            state.phase = RunPhase::Idle;
            state.users.store(0, Ordering::SeqCst);
        }

        tracing::warn!(%test_id, "run dropped before it was persisted");
        self.release();
    }

    fn release(&self) {
        self.active.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Releases the run slot if `drive` is dropped before `finalize` returns.
struct AbandonGuard<'a> {
    runner: &'a LoadRunner,
    test_id: TestId,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.runner.abandon(self.test_id);
        }
    }
}
