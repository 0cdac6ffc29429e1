//! Agent transport against a collector with every ingress stage enabled

use std::sync::Arc;

use assert_matches::assert_matches;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tally::api::IngressSecurity;
use tally::model::{Metric, MetricKind};
use tally::retry::RetryPolicy;
use tally::transport::signing::{HASH_HEADER, SigningKey};
use tally::transport::{DeliveryError, DeliveryTransport, REAL_IP_HEADER};

use crate::helpers::*;

const SECRET: &str = "shared-secret";

fn batch() -> Vec<Metric> {
    vec![
        Metric::counter("PollCount", 2).unwrap(),
        Metric::gauge("RandomValue", 0.75).unwrap(),
    ]
}

async fn secured_collector() -> (TestCollector, tally::transport::crypto::Encryptor) {
    let (encryptor, decryptor) = keypair();
    let security = IngressSecurity {
        trusted_subnet: Some("127.0.0.0/8".parse().unwrap()),
        decryptor: Some(Arc::new(decryptor)),
        signing_key: Some(SigningKey::new(SECRET).unwrap()),
    };

    (spawn_collector(security).await, encryptor)
}

#[tokio::test]
async fn test_full_stack_delivery() {
    let (collector, encryptor) = secured_collector().await;

    let transport = DeliveryTransport::new(&collector.address())
        .unwrap()
        .with_signing_key(SigningKey::new(SECRET).unwrap())
        .with_encryptor(encryptor)
        .with_real_ip("127.0.0.1".parse().unwrap())
        .with_retry(RetryPolicy::none());

    transport.deliver(&batch()).await.unwrap();
    transport.deliver(&batch()).await.unwrap();

    assert_eq!(
        collector
            .engine
            .read(MetricKind::Counter, "PollCount")
            .await
            .unwrap(),
        Some(Metric::counter("PollCount", 4).unwrap())
    );

    collector.stop().await;
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let (collector, encryptor) = secured_collector().await;

    let transport = DeliveryTransport::new(&collector.address())
        .unwrap()
        .with_signing_key(SigningKey::new("not-the-secret").unwrap())
        .with_encryptor(encryptor)
        .with_real_ip("127.0.0.1".parse().unwrap())
        .with_retry(RetryPolicy::none());

    let result = transport.deliver(&batch()).await;
    assert_matches!(
        result,
        Err(DeliveryError::Status { status }) if status == StatusCode::BAD_REQUEST
    );
    assert!(collector.engine.list().await.unwrap().is_empty());

    collector.stop().await;
}

#[tokio::test]
async fn test_foreign_public_key_is_rejected() {
    let (collector, _) = secured_collector().await;
    let (foreign, _) = keypair();

    let transport = DeliveryTransport::new(&collector.address())
        .unwrap()
        .with_signing_key(SigningKey::new(SECRET).unwrap())
        .with_encryptor(foreign)
        .with_real_ip("127.0.0.1".parse().unwrap())
        .with_retry(RetryPolicy::none());

    assert_matches!(
        transport.deliver(&batch()).await,
        Err(DeliveryError::Status { status }) if status == StatusCode::BAD_REQUEST
    );

    collector.stop().await;
}

#[tokio::test]
async fn test_untrusted_origin_is_forbidden() {
    let (collector, encryptor) = secured_collector().await;

    let outside = DeliveryTransport::new(&collector.address())
        .unwrap()
        .with_signing_key(SigningKey::new(SECRET).unwrap())
        .with_encryptor(encryptor)
        .with_real_ip("10.1.2.3".parse().unwrap())
        .with_retry(RetryPolicy::none());
    assert_matches!(
        outside.deliver(&batch()).await,
        Err(DeliveryError::Status { status }) if status == StatusCode::FORBIDDEN
    );

    let anonymous = client()
        .get(collector.url("/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);

    collector.stop().await;
}

#[tokio::test]
async fn test_unsigned_request_is_accepted_and_response_signed() {
    let key = SigningKey::new(SECRET).unwrap();
    let collector = spawn_collector(IngressSecurity {
        signing_key: Some(key.clone()),
        ..Default::default()
    })
    .await;

    let response = client()
        .post(collector.url("/update/"))
        .header(CONTENT_TYPE, "application/json")
        .header(REAL_IP_HEADER, "127.0.0.1")
        .body(r#"{"id":"plain","type":"gauge","value":3.5}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let signature = response.headers()[HASH_HEADER]
        .to_str()
        .unwrap()
        .to_string();
    let body = response.bytes().await.unwrap();
    assert!(key.verify(&body, &signature));

    collector.stop().await;
}
