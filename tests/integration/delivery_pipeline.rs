//! Dispatcher, samplers and transport delivering into a live collector

use std::time::Duration;

use tally::agent::{DispatchSettings, Dispatcher};
use tally::api::IngressSecurity;
use tally::model::{Batch, Metric, MetricKind, MetricValue};
use tally::sampler::{RuntimeSampler, Sampler};
use tally::transport::DeliveryTransport;

use crate::helpers::*;

/// Emits one `Ticks` counter per poll and a fixed gauge
struct Ticker {
    polls: i64,
}

impl Sampler for Ticker {
    fn name(&self) -> &str {
        "ticker"
    }

    fn update(&mut self) {
        self.polls += 1;
    }

    fn snapshot(&mut self) -> Batch {
        let batch = vec![
            Metric::counter("Ticks", self.polls).unwrap(),
            Metric::gauge("Level", 7.0).unwrap(),
        ];
        self.polls = 0;
        batch
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test]
async fn test_counter_total_matches_polls() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let transport = DeliveryTransport::new(&collector.address()).unwrap();

    let settings = DispatchSettings {
        poll_interval: Duration::from_millis(10),
        report_interval: Duration::from_millis(50),
        rate_limit: 2,
    };
    let handle = Dispatcher::new(settings, transport)
        .with_sampler(Ticker { polls: 0 })
        .start();

    let engine = collector.engine.clone();
    wait_until(|| {
        let engine = engine.clone();
        async move {
            matches!(
                engine.read(MetricKind::Counter, "Ticks").await,
                Ok(Some(Metric { value: MetricValue::Counter(n), .. })) if n >= 20
            )
        }
    })
    .await;
    handle.shutdown().await;

    assert!(ticks_total(&collector).await >= 20);
    assert_eq!(
        collector
            .engine
            .read(MetricKind::Gauge, "Level")
            .await
            .unwrap(),
        Some(Metric::gauge("Level", 7.0).unwrap())
    );

    collector.stop().await;
}

async fn ticks_total(collector: &TestCollector) -> i64 {
    match collector
        .engine
        .read(MetricKind::Counter, "Ticks")
        .await
        .unwrap()
    {
        Some(Metric {
            value: MetricValue::Counter(n),
            ..
        }) => n,
        other => panic!("unexpected Ticks state: {other:?}"),
    }
}

#[tokio::test]
async fn test_runtime_sampler_reaches_collector() {
    let collector = spawn_collector(IngressSecurity::default()).await;
    let transport = DeliveryTransport::new(&collector.address()).unwrap();

    let settings = DispatchSettings {
        poll_interval: Duration::from_millis(20),
        report_interval: Duration::from_millis(40),
        rate_limit: 1,
    };
    let handle = Dispatcher::new(settings, transport)
        .with_sampler(RuntimeSampler::new())
        .start();

    let engine = collector.engine.clone();
    wait_until(|| {
        let engine = engine.clone();
        async move {
            matches!(engine.read(MetricKind::Counter, "PollCount").await, Ok(Some(_)))
                && matches!(engine.read(MetricKind::Gauge, "RandomValue").await, Ok(Some(_)))
        }
    })
    .await;

    handle.shutdown().await;
    collector.stop().await;
}
