//! Local filesystem implementation of HistoryStore
//!
//! Each run lives in `<base_dir>/<test_id>/` as five JSON files. Writes go
//! through a hidden staging directory that is renamed into place, and
//! deletes rename the record to a hidden tombstone before removing it, so a
//! reader never observes a half-written or half-deleted record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use guardload_core::{CoreError, CoreResult, HistoryMeta, TestHistoryRecord, TestId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    sort_newest_first, HistoryStore, ANALYSIS_FILE, CONFIG_FILE, HISTORY_FILE, META_FILE,
    STATS_FILE,
};

/// Local filesystem history store
///
/// # Example
///
/// ```rust,no_run
/// use guardload_storage::{HistoryStore, LocalHistoryStore};
///
/// #[tokio::main]
/// async fn main() -> guardload_core::CoreResult<()> {
///     let store = LocalHistoryStore::new("./performance_history").await?;
///     for meta in store.list().await? {
///         println!("{} {} {:?}", meta.test_id, meta.test_type, meta.status);
///     }
///     Ok(())
/// }
/// ```
pub struct LocalHistoryStore {
    base_dir: PathBuf,
}

impl LocalHistoryStore {
    /// Create a new local history store
    ///
    /// Creates the base directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` if directory creation fails
    pub async fn new(base_dir: impl AsRef<Path>) -> CoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_dir(&self, test_id: TestId) -> PathBuf {
        self.base_dir.join(test_id.to_string())
    }

    fn staging_dir(&self, test_id: TestId) -> PathBuf {
        self.base_dir.join(format!(".{}.staging", test_id))
    }

    fn tombstone_dir(&self, test_id: TestId) -> PathBuf {
        self.base_dir.join(format!(".{}.deleting", test_id))
    }
}

async fn exists(path: &Path) -> CoreResult<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn remove_dir_if_present(path: &Path) -> CoreResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let data =
        serde_json::to_vec_pretty(value).map_err(|e| CoreError::Serialization(e.to_string()))?;
    tokio::fs::write(path, data).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}

#[async_trait]
impl HistoryStore for LocalHistoryStore {
    async fn save(&self, record: &TestHistoryRecord) -> CoreResult<()> {
        let test_id = record.meta.test_id;
        let staging = self.staging_dir(test_id);

        remove_dir_if_present(&staging).await?;
        tokio::fs::create_dir_all(&staging).await?;

        write_json(&staging.join(META_FILE), &record.meta).await?;
        write_json(&staging.join(CONFIG_FILE), &record.config).await?;
        write_json(&staging.join(STATS_FILE), &record.stats).await?;
        write_json(&staging.join(HISTORY_FILE), &record.history).await?;
        if let Some(analysis) = &record.analysis {
            write_json(&staging.join(ANALYSIS_FILE), analysis).await?;
        }

        let target = self.record_dir(test_id);
        if exists(&target).await? {
            let tombstone = self.tombstone_dir(test_id);
            remove_dir_if_present(&tombstone).await?;
            tokio::fs::rename(&target, &tombstone).await?;
            tokio::fs::rename(&staging, &target).await?;
            remove_dir_if_present(&tombstone).await?;
        } else {
            tokio::fs::rename(&staging, &target).await?;
        }

        tracing::debug!(%test_id, path = %target.display(), "history record saved");
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<HistoryMeta>> {
        let mut metas = Vec::new();

        let mut read_dir = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(metas),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            if !entry.metadata().await?.is_dir() {
                continue;
            }

            let meta_path = entry.path().join(META_FILE);
            if !exists(&meta_path).await? {
                continue;
            }

            match read_json::<HistoryMeta>(&meta_path).await {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    tracing::warn!(path = %meta_path.display(), "skipping unreadable history entry: {}", e);
                }
            }
        }

        sort_newest_first(&mut metas);
        Ok(metas)
    }

    async fn get(&self, test_id: TestId) -> CoreResult<TestHistoryRecord> {
        let dir = self.record_dir(test_id);
        if !exists(&dir).await? {
            return Err(CoreError::not_found("test history", test_id.to_string()));
        }

        let analysis = match read_json(&dir.join(ANALYSIS_FILE)).await {
            Ok(analysis) => Some(analysis),
            Err(CoreError::Io(e)) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        Ok(TestHistoryRecord {
            meta: read_json(&dir.join(META_FILE)).await?,
            config: read_json(&dir.join(CONFIG_FILE)).await?,
            stats: read_json(&dir.join(STATS_FILE)).await?,
            history: read_json(&dir.join(HISTORY_FILE)).await?,
            analysis,
        })
    }

    async fn delete(&self, test_id: TestId) -> CoreResult<()> {
        let dir = self.record_dir(test_id);
        if !exists(&dir).await? {
            return Err(CoreError::not_found("test history", test_id.to_string()));
        }

        let tombstone = self.tombstone_dir(test_id);
        remove_dir_if_present(&tombstone).await?;
        tokio::fs::rename(&dir, &tombstone).await?;
        tokio::fs::remove_dir_all(&tombstone).await?;

        tracing::info!(%test_id, "history record deleted");
        Ok(())
    }
}
