//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use rsa::{RsaPrivateKey, RsaPublicKey};
use tally::api::{ApiConfig, ApiServer, ApiState, IngressSecurity, spawn_api_server};
use tally::merge::MergeEngine;
use tally::storage::StorageBackend;
use tally::storage::memory::MemoryBackend;
use tally::transport::crypto::{Decryptor, Encryptor};

pub struct TestCollector {
    pub server: ApiServer,
    pub engine: MergeEngine,
    pub base_url: String,
}

impl TestCollector {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn address(&self) -> String {
        self.server.local_addr().to_string()
    }

    pub async fn stop(self) {
        self.server.shutdown(Duration::from_secs(5)).await.unwrap();
    }
}

/// Collector on an ephemeral port backed by `backend`
pub async fn spawn_collector_with(
    backend: Arc<dyn StorageBackend>,
    security: IngressSecurity,
) -> TestCollector {
    let engine = MergeEngine::new(backend);
    let config = ApiConfig::new("127.0.0.1:0".parse().unwrap()).with_security(security);

    let server = spawn_api_server(config, ApiState::new(engine.clone()))
        .await
        .unwrap();
    let base_url = format!("http://{}", server.local_addr());

    TestCollector {
        server,
        engine,
        base_url,
    }
}

/// In-memory collector with the given ingress stages
pub async fn spawn_collector(security: IngressSecurity) -> TestCollector {
    spawn_collector_with(Arc::new(MemoryBackend::new()), security).await
}

pub fn keypair() -> (Encryptor, Decryptor) {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let public = RsaPublicKey::from(&private);
    (
        Encryptor::new(public).unwrap(),
        Decryptor::new(private).unwrap(),
    )
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}
