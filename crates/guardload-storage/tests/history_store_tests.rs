//! Contract tests for HistoryStore backends

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use guardload_core::{
    analyze, CoreError, FatigueConfig, FinalStats, HistoryMeta, HistoryPoint, RunStatus,
    TargetConfig, TestHistoryRecord, TestId, TestRequest, TestType,
};
use guardload_storage::{
    HistoryStore, LocalHistoryStore, MemoryHistoryStore, HISTORY_FILE, META_FILE, STATS_FILE,
};
use tempfile::TempDir;

fn sample_record(start_offset_secs: i64) -> TestHistoryRecord {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
        + ChronoDuration::seconds(start_offset_secs);
    let history: Vec<HistoryPoint> = (0..5)
        .map(|i| HistoryPoint {
            timestamp: start.timestamp_millis() + i * 1000,
            // Values that are not exactly representable in binary
            rps: 33.33 + i as f64 * 0.1,
            error_rps: 0.1,
            avg_latency_ms: 12.34,
            p95_latency_ms: 45.67,
            p99_latency_ms: 78.91,
            concurrent_users: 4,
        })
        .collect();
    let stats = FinalStats {
        total_requests: 170,
        success_requests: 169,
        error_requests: 1,
        avg_latency_ms: 12.34,
        max_rps: 33.73,
        p95_latency_ms: 45.67,
        p99_latency_ms: 78.91,
    };
    let analysis = analyze(&stats, &history, TestType::Fatigue);

    TestHistoryRecord {
        meta: HistoryMeta {
            test_id: TestId::new(),
            start_time: start,
            end_time: start + ChronoDuration::seconds(5),
            duration: 5,
            test_type: TestType::Fatigue,
            app_id: "app-under-test".to_string(),
            status: RunStatus::Completed,
            operator: Some("alice".to_string()),
        },
        config: TestRequest {
            test_type: TestType::Fatigue,
            target_config: TargetConfig::new("app-under-test", "hello"),
            step_config: None,
            fatigue_config: Some(FatigueConfig {
                concurrency: 4,
                duration: 10,
            }),
        },
        stats,
        history,
        analysis: Some(analysis),
    }
}

async fn local_store() -> (TempDir, LocalHistoryStore) {
    let dir = TempDir::new().unwrap();
    let store = LocalHistoryStore::new(dir.path().join("history")).await.unwrap();
    (dir, store)
}

async fn check_contract(store: &dyn HistoryStore) {
    let older = sample_record(0);
    let newer = sample_record(60);

    store.save(&older).await.unwrap();
    store.save(&newer).await.unwrap();

    let list = store.list().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].test_id, newer.meta.test_id);
    assert_eq!(list[1].test_id, older.meta.test_id);

    let loaded = store.get(older.meta.test_id).await.unwrap();
    assert_eq!(loaded, older);

    store.delete(older.meta.test_id).await.unwrap();
    assert!(matches!(
        store.get(older.meta.test_id).await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        store.delete(older.meta.test_id).await,
        Err(CoreError::NotFound { .. })
    ));
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = MemoryHistoryStore::new();
    check_contract(&store).await;
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_local_store_contract() {
    let (_dir, store) = local_store().await;
    check_contract(&store).await;
}

#[tokio::test]
async fn test_local_store_writes_five_files() {
    let (_dir, store) = local_store().await;
    let record = sample_record(0);
    store.save(&record).await.unwrap();

    let record_dir = store.base_dir().join(record.meta.test_id.to_string());
    for file in [META_FILE, "config.json", STATS_FILE, HISTORY_FILE, "analysis.json"] {
        let bytes = std::fs::read(record_dir.join(file)).unwrap();
        // Each file parses on its own
        serde_json::from_slice::<serde_json::Value>(&bytes).unwrap();
    }
}

#[tokio::test]
async fn test_local_store_round_trip_is_byte_identical() {
    let (_dir, store) = local_store().await;
    let record = sample_record(0);
    store.save(&record).await.unwrap();

    let loaded = store.get(record.meta.test_id).await.unwrap();
    let record_dir = store.base_dir().join(record.meta.test_id.to_string());

    let stats_on_disk = std::fs::read(record_dir.join(STATS_FILE)).unwrap();
    let history_on_disk = std::fs::read(record_dir.join(HISTORY_FILE)).unwrap();

    assert_eq!(serde_json::to_vec_pretty(&loaded.stats).unwrap(), stats_on_disk);
    assert_eq!(serde_json::to_vec_pretty(&loaded.history).unwrap(), history_on_disk);
    assert_eq!(loaded.stats, record.stats);
    assert_eq!(loaded.history, record.history);
}

#[tokio::test]
async fn test_local_store_record_without_analysis() {
    let (_dir, store) = local_store().await;
    let mut record = sample_record(0);
    record.analysis = None;
    store.save(&record).await.unwrap();

    let loaded = store.get(record.meta.test_id).await.unwrap();
    assert!(loaded.analysis.is_none());
}

#[tokio::test]
async fn test_local_store_resave_replaces_record() {
    let (_dir, store) = local_store().await;
    let mut record = sample_record(0);
    store.save(&record).await.unwrap();

    record.meta.status = RunStatus::Stopped;
    record.analysis = None;
    store.save(&record).await.unwrap();

    let loaded = store.get(record.meta.test_id).await.unwrap();
    assert_eq!(loaded.meta.status, RunStatus::Stopped);
    assert!(loaded.analysis.is_none());
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_local_store_list_skips_junk() {
    let (_dir, store) = local_store().await;
    let record = sample_record(0);
    store.save(&record).await.unwrap();

    let base = store.base_dir();
    // Corrupt meta
    std::fs::create_dir_all(base.join("broken")).unwrap();
    std::fs::write(base.join("broken").join(META_FILE), b"{not json").unwrap();
    // Directory with no meta
    std::fs::create_dir_all(base.join("empty")).unwrap();
    // Leftover staging directory from a crashed save
    std::fs::create_dir_all(base.join(".abc.staging")).unwrap();
    // Stray file
    std::fs::write(base.join("notes.txt"), b"hi").unwrap();

    let list = store.list().await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].test_id, record.meta.test_id);
}

#[tokio::test]
async fn test_local_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let record = sample_record(0);
    {
        let store = LocalHistoryStore::new(dir.path()).await.unwrap();
        store.save(&record).await.unwrap();
    }

    let reopened = LocalHistoryStore::new(dir.path()).await.unwrap();
    assert_eq!(reopened.get(record.meta.test_id).await.unwrap(), record);
}
