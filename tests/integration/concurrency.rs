//! Concurrent writers against one collector

use std::sync::Arc;

use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::json;
use tally::api::IngressSecurity;
use tally::model::{Metric, MetricKind};
use tally::storage::file::{FileBackend, Persistence};

use crate::helpers::*;

const WRITERS: i64 = 16;
const UPDATES_PER_WRITER: i64 = 25;

#[tokio::test]
async fn test_concurrent_counter_updates_are_not_lost() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let client = client();

    let writers = (0..WRITERS).map(|_| {
        let client = client.clone();
        let url = collector.url("/update/counter/shared/1");
        tokio::spawn(async move {
            for _ in 0..UPDATES_PER_WRITER {
                let status = client.post(&url).send().await.unwrap().status();
                assert_eq!(status, StatusCode::OK);
            }
        })
    });

    for result in join_all(writers).await {
        result.unwrap();
    }

    assert_eq!(
        collector
            .engine
            .read(MetricKind::Counter, "shared")
            .await
            .unwrap(),
        Some(Metric::counter("shared", WRITERS * UPDATES_PER_WRITER).unwrap())
    );

    collector.stop().await;
}

#[tokio::test]
async fn test_concurrent_batches_with_write_through() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    let backend = Arc::new(
        FileBackend::open(&path, false, Persistence::WriteThrough)
            .await
            .unwrap(),
    );
    let collector = spawn_collector_with(backend.clone(), IngressSecurity::default()).await;
    let client = client();

    let writers = (0..WRITERS).map(|i| {
        let client = client.clone();
        let url = collector.url("/updates/");
        tokio::spawn(async move {
            let body = json!([
                {"id": "batches", "type": "counter", "delta": 1},
                {"id": format!("writer-{i}"), "type": "gauge", "value": i as f64}
            ]);
            client.post(&url).json(&body).send().await.unwrap().status()
        })
    });

    for result in join_all(writers).await {
        assert_eq!(result.unwrap(), StatusCode::OK);
    }

    // The last write-through snapshot holds every update
    let on_disk = tally::storage::snapshot::SnapshotFile::new(&path)
        .load()
        .await
        .unwrap();
    assert_eq!(on_disk.len() as i64, WRITERS + 1);
    assert!(on_disk.contains(&Metric::counter("batches", WRITERS).unwrap()));

    collector.stop().await;
}
