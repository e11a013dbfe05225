//! Persistence of completed load-test runs.
//!
//! Provides a unified interface over two backends:
//! - Local filesystem, one directory per run (production)
//! - In-memory map (tests and ephemeral deployments)

mod local;
mod memory;

pub use local::LocalHistoryStore;
pub use memory::MemoryHistoryStore;

use async_trait::async_trait;
use guardload_core::{CoreResult, HistoryMeta, TestHistoryRecord, TestId};

/// File names making up one persisted record.
pub const META_FILE: &str = "meta.json";
pub const CONFIG_FILE: &str = "config.json";
pub const STATS_FILE: &str = "stats.json";
pub const HISTORY_FILE: &str = "history.json";
pub const ANALYSIS_FILE: &str = "analysis.json";

/// History store trait - one durable record per test id
///
/// All implementations must be thread-safe (Send + Sync).
///
/// # Error Handling
///
/// - `CoreError::NotFound` - `get`/`delete` of an unknown test id
/// - `CoreError::Io` - filesystem failure (local backend only)
/// - `CoreError::Deserialization` - a record file is corrupt
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a completed run. Overwrites an existing record with the same id.
    async fn save(&self, record: &TestHistoryRecord) -> CoreResult<()>;

    /// All run summaries, newest start time first.
    async fn list(&self) -> CoreResult<Vec<HistoryMeta>>;

    /// Full record of one run.
    async fn get(&self, test_id: TestId) -> CoreResult<TestHistoryRecord>;

    /// Remove a record as a whole.
    async fn delete(&self, test_id: TestId) -> CoreResult<()>;
}

pub(crate) fn sort_newest_first(metas: &mut [HistoryMeta]) {
    metas.sort_by(|a, b| b.start_time.cmp(&a.start_time));
}
