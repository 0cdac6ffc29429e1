//! Collector HTTP surface over a real socket

use std::io::Read;

use flate2::read::GzDecoder;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use serde_json::{Value, json};
use tally::api::IngressSecurity;
use tally::model::{Metric, MetricKind};

use crate::helpers::*;

#[tokio::test]
async fn test_path_updates_accumulate_and_replace() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let client = client();

    for path in [
        "/update/counter/PollCount/3",
        "/update/counter/PollCount/4",
        "/update/gauge/Alloc/1.5",
        "/update/gauge/Alloc/2.25",
    ] {
        let response = client.post(collector.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }

    let counter = client
        .get(collector.url("/value/counter/PollCount"))
        .send()
        .await
        .unwrap();
    assert_eq!(counter.text().await.unwrap(), "7");

    let gauge = client
        .get(collector.url("/value/gauge/Alloc"))
        .send()
        .await
        .unwrap();
    assert_eq!(gauge.text().await.unwrap(), "2.25");

    collector.stop().await;
}

#[tokio::test]
async fn test_json_update_returns_stored_state() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let client = client();

    for expected in [5, 10] {
        let response = client
            .post(collector.url("/update/"))
            .json(&json!({"id": "hits", "type": "counter", "delta": 5}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"id": "hits", "type": "counter", "delta": expected}));
    }

    let response = client
        .post(collector.url("/value/"))
        .json(&json!({"id": "hits", "type": "counter"}))
        .send()
        .await
        .unwrap();
    let metric: Metric = response.json().await.unwrap();
    assert_eq!(metric, Metric::counter("hits", 10).unwrap());

    let missing = client
        .post(collector.url("/value/"))
        .json(&json!({"id": "hits", "type": "gauge"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    collector.stop().await;
}

#[tokio::test]
async fn test_batch_update() {
    let collector = spawn_collector(IngressSecurity::default()).await;

    let response = client()
        .post(collector.url("/updates/"))
        .json(&json!([
            {"id": "a", "type": "counter", "delta": 1},
            {"id": "a", "type": "counter", "delta": 2},
            {"id": "b", "type": "gauge", "value": 0.5}
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"updated": 3}));

    assert_eq!(
        collector.engine.list().await.unwrap(),
        vec![
            Metric::counter("a", 3).unwrap(),
            Metric::gauge("b", 0.5).unwrap(),
        ]
    );

    collector.stop().await;
}

#[tokio::test]
async fn test_client_errors() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let client = client();

    let unknown_kind = client
        .post(collector.url("/update/summary/x/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_kind.status(), StatusCode::BAD_REQUEST);

    let wrong_media = client
        .post(collector.url("/updates/"))
        .header(CONTENT_TYPE, "text/plain")
        .body("[]")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_media.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let malformed = client
        .post(collector.url("/updates/"))
        .header(CONTENT_TYPE, "application/json")
        .body("[{")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    client
        .post(collector.url("/update/gauge/temp/1"))
        .send()
        .await
        .unwrap();
    let mismatch = client
        .post(collector.url("/update/counter/temp/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
    let body: Value = mismatch.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("temp"));

    let wrong_method = client
        .get(collector.url("/updates/"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);

    collector.stop().await;
}

#[tokio::test]
async fn test_listing_text_and_html() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let client = client();

    client
        .post(collector.url("/update/gauge/<script>/1"))
        .send()
        .await
        .unwrap();

    let text = client.get(collector.url("/")).send().await.unwrap();
    assert!(
        text.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(text.text().await.unwrap(), "<script> (gauge): 1\n");

    let html = client
        .get(collector.url("/"))
        .header(ACCEPT, "text/html,application/xhtml+xml")
        .send()
        .await
        .unwrap();
    assert!(
        html.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    let page = html.text().await.unwrap();
    assert!(page.contains("&lt;script&gt;"));
    assert!(!page.contains("<script>"));

    collector.stop().await;
}

#[tokio::test]
async fn test_gzip_request_and_response() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let body = tally::transport::gzip::compress(
        br#"[{"id":"zipped","type":"counter","delta":42}]"#,
    )
    .unwrap();

    let response = client()
        .post(collector.url("/updates/"))
        .header(CONTENT_TYPE, "application/json")
        .header(CONTENT_ENCODING, "gzip")
        .header(ACCEPT_ENCODING, "gzip")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");

    let compressed = response.bytes().await.unwrap();
    let mut json = String::new();
    GzDecoder::new(&compressed[..])
        .read_to_string(&mut json)
        .unwrap();
    assert_eq!(json, r#"{"updated":1}"#);

    let stored = collector
        .engine
        .read(MetricKind::Counter, "zipped")
        .await
        .unwrap();
    assert_eq!(stored, Some(Metric::counter("zipped", 42).unwrap()));

    collector.stop().await;
}

#[tokio::test]
async fn test_ping() {
    let collector = spawn_collector(IngressSecurity::default()).await;

    let response = client().get(collector.url("/ping")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["checked_at"].is_string());

    collector.stop().await;
}

#[tokio::test]
async fn test_same_batch_twice_doubles_counters() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let batch = json!([
        {"id": "hits", "type": "counter", "delta": 5},
        {"id": "hits", "type": "counter", "delta": 7}
    ]);

    for _ in 0..2 {
        let response = client()
            .post(collector.url("/updates/"))
            .json(&batch)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let value = client()
        .get(collector.url("/value/counter/hits"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(value, "24");

    collector.stop().await;
}
