//! Snapshot and database persistence across collector restarts

use std::time::Duration;

use assert_matches::assert_matches;
use reqwest::StatusCode;
use serde_json::json;
use tally::api::IngressSecurity;
use tally::model::Metric;
use tally::storage::{self, StorageError, StorageSettings};

use crate::helpers::*;

fn file_settings(dir: &tempfile::TempDir, store_interval: Duration) -> StorageSettings {
    StorageSettings {
        file_storage_path: dir.path().join("data.json"),
        restore: true,
        store_interval,
        database_dsn: None,
    }
}

async fn post_updates(collector: &TestCollector, body: serde_json::Value) -> StatusCode {
    client()
        .post(collector.url("/updates/"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_write_through_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let settings = file_settings(&dir, Duration::ZERO);

    let opened = storage::open(&settings).await.unwrap();
    let collector = spawn_collector_with(opened.backend.clone(), IngressSecurity::default()).await;
    assert_eq!(
        post_updates(
            &collector,
            json!([
                {"id": "hits", "type": "counter", "delta": 4},
                {"id": "temp", "type": "gauge", "value": 21.5}
            ])
        )
        .await,
        StatusCode::OK
    );

    // Written on the update itself, before any shutdown hook runs
    let on_disk = std::fs::read_to_string(&settings.file_storage_path).unwrap();
    assert!(on_disk.contains("hits"));

    collector.stop().await;
    opened.shutdown().await.unwrap();

    let reopened = storage::open(&settings).await.unwrap();
    assert_eq!(
        reopened.backend.all().await.unwrap(),
        vec![
            Metric::counter("hits", 4).unwrap(),
            Metric::gauge("temp", 21.5).unwrap(),
        ]
    );
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_periodic_snapshot_written_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let settings = file_settings(&dir, Duration::from_secs(300));

    let opened = storage::open(&settings).await.unwrap();
    let collector = spawn_collector_with(opened.backend.clone(), IngressSecurity::default()).await;
    post_updates(&collector, json!([{"id": "hits", "type": "counter", "delta": 9}])).await;

    // Between ticks only memory has the update
    assert!(!settings.file_storage_path.exists());

    collector.stop().await;
    opened.shutdown().await.unwrap();

    let reopened = storage::open(&settings).await.unwrap();
    let collector =
        spawn_collector_with(reopened.backend.clone(), IngressSecurity::default()).await;
    let value = client()
        .get(collector.url("/value/counter/hits"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(value, "9");

    collector.stop().await;
    reopened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_existing_snapshot_is_served_after_start() {
    let dir = tempfile::tempdir().unwrap();
    let settings = file_settings(&dir, Duration::from_secs(300));
    std::fs::write(
        &settings.file_storage_path,
        r#"[{"id":"hits","type":"counter","delta":12}]"#,
    )
    .unwrap();

    let opened = storage::open(&settings).await.unwrap();
    let collector = spawn_collector_with(opened.backend.clone(), IngressSecurity::default()).await;

    let value = client()
        .get(collector.url("/value/counter/hits"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(value, "12");

    collector.stop().await;
    opened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restore_disabled_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = file_settings(&dir, Duration::ZERO);
    std::fs::write(
        &settings.file_storage_path,
        r#"[{"id":"old","type":"counter","delta":1}]"#,
    )
    .unwrap();

    settings.restore = false;
    let opened = storage::open(&settings).await.unwrap();
    assert!(opened.backend.all().await.unwrap().is_empty());
    opened.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_snapshot_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    let settings = file_settings(&dir, Duration::ZERO);
    std::fs::write(&settings.file_storage_path, "[{\"id\":").unwrap();

    assert_matches!(
        storage::open(&settings).await,
        Err(StorageError::CorruptSnapshot { .. })
    );
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_sqlite_batch_is_atomic_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = file_settings(&dir, Duration::ZERO);
    settings.database_dsn = Some(dir.path().join("metrics.db").to_string_lossy().into_owned());

    let opened = storage::open(&settings).await.unwrap();
    let collector = spawn_collector_with(opened.backend.clone(), IngressSecurity::default()).await;

    assert_eq!(
        post_updates(&collector, json!([{"id": "temp", "type": "gauge", "value": 1.0}])).await,
        StatusCode::OK
    );
    assert_eq!(
        post_updates(
            &collector,
            json!([
                {"id": "hits", "type": "counter", "delta": 1},
                {"id": "temp", "type": "counter", "delta": 1}
            ])
        )
        .await,
        StatusCode::BAD_REQUEST
    );

    collector.stop().await;
    opened.shutdown().await.unwrap();

    let reopened = storage::open(&settings).await.unwrap();
    assert_eq!(
        reopened.backend.all().await.unwrap(),
        vec![Metric::gauge("temp", 1.0).unwrap()]
    );
    reopened.shutdown().await.unwrap();
}
