//! Load profile drivers: decide how many workers exist and for how long.

use std::time::Duration;

use guardload_core::{CoreError, CoreResult, LoadProfile};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::worker::{RunContext, WorkerPool};

/// How a profile's schedule ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileOutcome {
    /// Every stage ran for its full duration
    Completed,
    /// Cancelled before the schedule ran out
    Cancelled,
}

/// Drive `profile` to completion or until the run is cancelled.
///
/// All workers have exited when this returns. A cancellation that arrives
/// while the last workers drain does not turn a finished schedule into
/// [`ProfileOutcome::Cancelled`].
pub async fn drive(
    profile: LoadProfile,
    ctx: RunContext,
    ramp_up_fraction: f64,
) -> CoreResult<ProfileOutcome> {
    match profile {
        LoadProfile::Fatigue {
            concurrency,
            duration,
        } => run_fatigue(ctx, concurrency, duration).await,
        LoadProfile::Step { step_duration, .. } => {
            run_step(ctx, profile.stages(), step_duration, ramp_up_fraction).await
        }
    }
}

/// Constant `concurrency` workers for `duration`.
async fn run_fatigue(
    ctx: RunContext,
    concurrency: u32,
    duration: Duration,
) -> CoreResult<ProfileOutcome> {
    let cancel = ctx.cancel.clone();
    let mut pool = WorkerPool::new(ctx);

    for _ in 0..concurrency {
        pool.spawn_one();
    }
    tracing::debug!(concurrency, "fatigue workers spawned");

    let outcome = if wait_until(Instant::now() + duration, &cancel).await {
        tracing::debug!("fatigue test interrupted by stop signal");
        ProfileOutcome::Cancelled
    } else {
        ProfileOutcome::Completed
    };

    finish(pool, outcome).await
}

/// Add workers stage by stage; never remove any until the end.
async fn run_step(
    ctx: RunContext,
    stages: Vec<u32>,
    step_duration: Duration,
    ramp_up_fraction: f64,
) -> CoreResult<ProfileOutcome> {
    let cancel = ctx.cancel.clone();
    let mut pool = WorkerPool::new(ctx);
    let ramp_window = step_duration.mul_f64(ramp_up_fraction);
    let mut outcome = ProfileOutcome::Completed;

    'stages: for (index, &stage_users) in stages.iter().enumerate() {
        if cancel.is_cancelled() {
            outcome = ProfileOutcome::Cancelled;
            break;
        }

        let stage_start = Instant::now();
        let incoming = (stage_users as usize).saturating_sub(pool.len());
        tracing::debug!(stage = index + 1, users = stage_users, incoming, "entering step stage");

        // Ramp-up: spread new workers evenly so connections don't open in one burst
        for i in 0..incoming {
            let offset = ramp_window.mul_f64(i as f64 / incoming as f64);
            if wait_until(stage_start + offset, &cancel).await {
                outcome = ProfileOutcome::Cancelled;
                break 'stages;
            }
            pool.spawn_one();
        }

        // Plateau for the rest of the stage
        if wait_until(stage_start + step_duration, &cancel).await {
            outcome = ProfileOutcome::Cancelled;
            break;
        }
    }

    finish(pool, outcome).await
}

/// Sleep until `deadline`; returns true if the run was cancelled first.
async fn wait_until(deadline: Instant, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = sleep_until(deadline) => false,
    }
}

async fn finish(pool: WorkerPool, outcome: ProfileOutcome) -> CoreResult<ProfileOutcome> {
    let spawned = pool.len();
    let panicked = pool.join().await;
    tracing::debug!(workers = spawned, "all workers joined");

    if panicked > 0 {
        return Err(CoreError::internal(format!(
            "{} of {} workers panicked",
            panicked, spawned
        )));
    }
    Ok(outcome)
}
