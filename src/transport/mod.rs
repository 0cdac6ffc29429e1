//! Delivery transport: how a batch leaves the agent
//!
//! ## Pipeline
//!
//! ```text
//! Batch -> JSON -> gzip -> HMAC (over the gzip bytes) -> RSA-OAEP -> POST /updates/
//! ```
//!
//! Signing and encryption are optional and independent. The body is prepared
//! once per batch; retries resend the same bytes.
//!
//! ## Headers
//!
//! - `Content-Type: application/json`
//! - `Content-Encoding: gzip`
//! - `HashSHA256: <hex>` when a secret key is configured
//! - `X-Real-IP: <agent address>` when the agent knows its address
//!
//! ## Failure classes
//!
//! Connection-level failures and 5xx answers are transient and retried with
//! the configured [`RetryPolicy`]. Everything else (4xx, encoding and
//! encryption failures) is permanent and returned immediately.

pub mod crypto;
pub mod gzip;
pub mod signing;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, instrument, trace};

use crate::model::Metric;
use crate::retry::{RetryPolicy, Retryable};
use crypto::{CryptoError, Encryptor};
use signing::{HASH_HEADER, SigningKey};

/// Header naming the agent's own address, checked by the trusted-subnet stage
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Path of the batch update endpoint
pub const UPDATES_PATH: &str = "/updates/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid collector address {0:?}")]
    InvalidAddress(String),

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),

    #[error("failed to encrypt batch: {0}")]
    Encrypt(#[from] CryptoError),

    #[error("batch preparation did not complete: {0}")]
    Prepare(#[from] tokio::task::JoinError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("collector answered {status}")]
    Status { status: StatusCode },
}

impl Retryable for DeliveryError {
    fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            DeliveryError::Status { status } => status.is_server_error(),
            _ => false,
        }
    }
}

/// A batch ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

/// Sends batches to the collector's batch endpoint
///
/// Cheap to clone; clones share one HTTP client and its connection pool.
#[derive(Debug, Clone)]
pub struct DeliveryTransport {
    client: reqwest::Client,
    endpoint: String,
    signing_key: Option<SigningKey>,
    encryptor: Option<Arc<Encryptor>>,
    real_ip: Option<IpAddr>,
    retry: RetryPolicy,
}

impl DeliveryTransport {
    /// Transport targeting `address`
    ///
    /// `address` is `host:port` or a full `http(s)://host:port` base URL.
    pub fn new(address: &str) -> Result<Self, DeliveryError> {
        let address = address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(DeliveryError::InvalidAddress(address.to_string()));
        }

        let base = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{base}{UPDATES_PATH}"),
            signing_key: None,
            encryptor: None,
            real_ip: None,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn with_encryptor(mut self, encryptor: Encryptor) -> Self {
        self.encryptor = Some(Arc::new(encryptor));
        self
    }

    pub fn with_real_ip(mut self, ip: IpAddr) -> Self {
        self.real_ip = Some(ip);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Encode, compress, sign and (optionally) encrypt a batch.
    pub fn prepare(&self, batch: &[Metric]) -> Result<Payload, DeliveryError> {
        let json = serde_json::to_vec(batch)?;
        let compressed = gzip::compress(&json)?;
        let signature = self.signing_key.as_ref().map(|key| key.sign(&compressed));

        let body = match &self.encryptor {
            Some(encryptor) => encryptor.encrypt(&compressed)?,
            None => compressed,
        };

        trace!(
            "prepared batch: {} bytes json, {} bytes on the wire",
            json.len(),
            body.len()
        );

        Ok(Payload { body, signature })
    }

    /// Deliver a batch, retrying transient failures
    ///
    /// Preparation runs on the blocking pool; RSA encryption of a large batch
    /// takes long enough to stall other tasks.
    #[instrument(skip_all, fields(count = batch.len()))]
    pub async fn deliver(&self, batch: &[Metric]) -> Result<(), DeliveryError> {
        let transport = self.clone();
        let batch = batch.to_vec();
        let payload = tokio::task::spawn_blocking(move || transport.prepare(&batch)).await??;
        self.retry.run(|| self.send(&payload)).await?;
        debug!("delivered batch");
        Ok(())
    }

    async fn send(&self, payload: &Payload) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(payload.body.clone());

        if let Some(signature) = &payload.signature {
            request = request.header(HASH_HEADER, signature);
        }
        if let Some(ip) = self.real_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status { status });
        }

        Ok(())
    }
}
