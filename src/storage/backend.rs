//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that every
//! metric store (in-memory, snapshot file, SQLite) implements.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::model::{Batch, Metric, MetricKind};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// When the check ran
    pub checked_at: DateTime<Utc>,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

impl HealthStatus {
    pub fn healthy(message: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
            checked_at: Utc::now(),
            metadata,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
            checked_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// Trait for metric stores holding the latest value of every metric
///
/// Implementations own the authoritative metric state and must serialize
/// read-modify-write cycles on the same id: two concurrent counter updates
/// must both be reflected.
///
/// ## Merge semantics
///
/// - Counter: the stored total grows by the update's delta (created at the
///   delta when absent)
/// - Gauge: the stored value is replaced (created when absent)
/// - An id keeps the kind it was created with; updates of the other kind fail
///   with [`crate::merge::MergeError::KindMismatch`]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Merge a single update and return the resulting stored state.
    async fn apply(&self, metric: Metric) -> StorageResult<Metric>;

    /// Merge a batch of updates
    ///
    /// Transactional backends apply the batch all-or-nothing. The in-memory
    /// store applies entries in order and stops at the first failing entry;
    /// entries before it stay applied.
    async fn apply_batch(&self, batch: Batch) -> StorageResult<()>;

    /// Look up the stored state of a metric.
    async fn get(&self, kind: MetricKind, id: &str) -> StorageResult<Option<Metric>>;

    /// All stored metrics, ordered by id.
    async fn all(&self) -> StorageResult<Vec<Metric>>;

    /// Check backend health
    ///
    /// Always healthy for the in-memory stores; a real round trip for SQLite.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    ///
    /// Flushes pending writes where the backend buffers any.
    async fn close(&self) -> StorageResult<()>;
}
