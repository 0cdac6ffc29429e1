//! Merge engine: type-specific update rules and the collector's write path
//!
//! Counters accumulate, gauges overwrite. [`merge`] is the pure rule used by
//! the in-memory stores under their write lock; the SQLite backend expresses
//! the same rule as upserts. [`MergeEngine`] is what the HTTP handlers hold:
//! every write and read of metric state goes through it.

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::model::{Batch, Metric, MetricKind, MetricValue};
use crate::storage::{HealthStatus, StorageBackend, StorageResult};

/// Update rejected because of the metric's stored state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error("metric {id:?} is a {stored}, cannot apply a {update} update")]
    KindMismatch {
        id: String,
        stored: MetricKind,
        update: MetricKind,
    },

    #[error("counter {id:?} would overflow")]
    Overflow { id: String },
}

/// Compute the new stored value for `id` from its current value and an update.
pub fn merge(
    id: &str,
    current: Option<&MetricValue>,
    update: &MetricValue,
) -> Result<MetricValue, MergeError> {
    match (current, update) {
        (None, update) => Ok(*update),
        (Some(MetricValue::Counter(total)), MetricValue::Counter(delta)) => total
            .checked_add(*delta)
            .map(MetricValue::Counter)
            .ok_or_else(|| MergeError::Overflow { id: id.to_string() }),
        (Some(MetricValue::Gauge(_)), MetricValue::Gauge(value)) => Ok(MetricValue::Gauge(*value)),
        (Some(stored), update) => Err(MergeError::KindMismatch {
            id: id.to_string(),
            stored: stored.kind(),
            update: update.kind(),
        }),
    }
}

/// The single writer of metric state
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct MergeEngine {
    backend: Arc<dyn StorageBackend>,
}

impl MergeEngine {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Apply one update and return the metric's resulting state.
    #[instrument(skip(self, metric), fields(id = %metric.id, kind = %metric.kind()))]
    pub async fn apply_update(&self, metric: Metric) -> StorageResult<Metric> {
        let stored = self.backend.apply(metric).await?;
        trace!("stored value is now {}", stored.value);
        Ok(stored)
    }

    /// Apply every update of a batch and return how many were applied.
    #[instrument(skip(self, batch), fields(count = batch.len()))]
    pub async fn apply_batch(&self, batch: Batch) -> StorageResult<usize> {
        let count = batch.len();
        if count == 0 {
            return Ok(0);
        }

        self.backend.apply_batch(batch).await?;
        debug!("applied batch of {count} updates");
        Ok(count)
    }

    pub async fn read(&self, kind: MetricKind, id: &str) -> StorageResult<Option<Metric>> {
        self.backend.get(kind, id).await
    }

    /// The stored value as plain text, as served by `GET /value/{type}/{name}`.
    pub async fn read_formatted(&self, kind: MetricKind, id: &str) -> StorageResult<Option<String>> {
        Ok(self
            .backend
            .get(kind, id)
            .await?
            .map(|metric| metric.value.to_string()))
    }

    pub async fn list(&self) -> StorageResult<Vec<Metric>> {
        self.backend.all().await
    }

    pub async fn ping(&self) -> StorageResult<HealthStatus> {
        self.backend.health_check().await
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}
