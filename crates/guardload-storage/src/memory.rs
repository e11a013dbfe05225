//! In-memory history store for testing

use std::collections::HashMap;

use async_trait::async_trait;
use guardload_core::{CoreError, CoreResult, HistoryMeta, TestHistoryRecord, TestId};
use parking_lot::RwLock;

use crate::{sort_newest_first, HistoryStore};

/// History store that keeps records in a map; lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<TestId, TestHistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save(&self, record: &TestHistoryRecord) -> CoreResult<()> {
        self.records
            .write()
            .insert(record.meta.test_id, record.clone());
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<HistoryMeta>> {
        let mut metas: Vec<HistoryMeta> = self
            .records
            .read()
            .values()
            .map(|r| r.meta.clone())
            .collect();
        sort_newest_first(&mut metas);
        Ok(metas)
    }

    async fn get(&self, test_id: TestId) -> CoreResult<TestHistoryRecord> {
        self.records
            .read()
            .get(&test_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("test history", test_id.to_string()))
    }

    async fn delete(&self, test_id: TestId) -> CoreResult<()> {
        self.records
            .write()
            .remove(&test_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("test history", test_id.to_string()))
    }
}
