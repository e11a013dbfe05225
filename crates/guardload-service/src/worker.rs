//! Long-lived request loop feeding the shared statistics window

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use guardload_core::{StatsWindow, TargetConfig};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::issuer::RequestIssuer;

/// Everything a worker of one run shares with its siblings.
#[derive(Clone)]
pub struct RunContext {
    pub issuer: Arc<dyn RequestIssuer>,
    pub target: Arc<TargetConfig>,
    pub stats: Arc<Mutex<StatsWindow>>,
    pub cancel: CancellationToken,
    /// Live worker count
    pub users: Arc<AtomicU32>,
    pub pause: Duration,
}

pub struct Worker {
    id: u32,
    ctx: RunContext,
}

impl Worker {
    pub fn new(id: u32, ctx: RunContext) -> Self {
        Self { id, ctx }
    }

    /// Issue requests until the run is cancelled.
    ///
    /// A request already in flight when cancellation arrives completes and
    /// is counted before the loop exits.
    pub async fn run(self) {
        tracing::trace!(worker = self.id, "worker started");

        while !self.ctx.cancel.is_cancelled() {
            let start = Instant::now();
            let result = self.ctx.issuer.issue(&self.ctx.target).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(_) => self.ctx.stats.lock().record_success(latency_ms),
                Err(e) => {
                    self.ctx.stats.lock().record_failure();
                    tracing::trace!(worker = self.id, "request failed: {}", e);
                }
            }

            tokio::select! {
                () = self.ctx.cancel.cancelled() => break,
                () = tokio::time::sleep(self.ctx.pause) => {}
            }
        }

        tracing::trace!(worker = self.id, "worker stopped");
    }
}

/// Workers spawned for one run. Only grows until [`WorkerPool::join`].
pub struct WorkerPool {
    ctx: RunContext,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            handles: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn spawn_one(&mut self) {
        let worker = Worker::new(self.handles.len() as u32, self.ctx.clone());
        self.handles.push(tokio::spawn(worker.run()));
        self.ctx.users.fetch_add(1, Ordering::SeqCst);
    }

    /// Cancel the run and wait for every worker to exit.
    ///
    /// Returns how many workers panicked.
    pub async fn join(self) -> usize {
        self.ctx.cancel.cancel();

        futures::future::join_all(self.handles)
            .await
            .into_iter()
            .filter(|res| res.is_err())
            .count()
    }
}
