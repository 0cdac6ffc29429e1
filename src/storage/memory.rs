//! In-memory storage backend
//!
//! Holds the latest value of every metric in a map guarded by a single
//! async `RwLock`. Writers take the lock for the whole read-modify-write
//! cycle, which is what keeps concurrent counter increments from being lost.
//!
//! ## Limitations
//!
//! - **No persistence**: wrap it in [`super::file::FileBackend`] to survive restarts
//! - **Not transactional**: a batch stops at the first failing entry and keeps
//!   the entries applied before it

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{HealthStatus, StorageBackend};
use super::error::StorageResult;
use crate::merge::merge;
use crate::model::{Batch, Metric, MetricKind, MetricValue};

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Current state keyed by metric id
    metrics: RwLock<HashMap<String, MetricValue>>,
}

impl MemoryBackend {
    /// Create a new, empty in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole state with `metrics`, e.g. from a snapshot
    ///
    /// Values are taken as absolute state, not merged. A later record for the
    /// same id wins.
    pub async fn restore(&self, metrics: Vec<Metric>) {
        let mut map = self.metrics.write().await;
        map.clear();
        for metric in metrics {
            map.insert(metric.id, metric.value);
        }
        debug!("restored {} metrics", map.len());
    }

    /// Number of stored metrics
    pub async fn len(&self) -> usize {
        self.metrics.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.metrics.read().await.is_empty()
    }

    /// Current values of `ids`, `None` for ids not stored yet
    pub(crate) async fn checkpoint<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Vec<(String, Option<MetricValue>)> {
        let map = self.metrics.read().await;
        ids.into_iter()
            .map(|id| (id.to_string(), map.get(id).copied()))
            .collect()
    }

    /// Put back the values captured by [`Self::checkpoint`]
    pub(crate) async fn rollback(&self, checkpoint: Vec<(String, Option<MetricValue>)>) {
        let mut map = self.metrics.write().await;
        for (id, value) in checkpoint {
            match value {
                Some(value) => map.insert(id, value),
                None => map.remove(&id),
            };
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn apply(&self, metric: Metric) -> StorageResult<Metric> {
        let mut map = self.metrics.write().await;
        let merged = merge(&metric.id, map.get(&metric.id), &metric.value)?;
        map.insert(metric.id.clone(), merged);

        Ok(Metric {
            id: metric.id,
            value: merged,
        })
    }

    async fn apply_batch(&self, batch: Batch) -> StorageResult<()> {
        let mut map = self.metrics.write().await;
        trace!("applying {} updates in memory", batch.len());

        for metric in batch {
            let merged = merge(&metric.id, map.get(&metric.id), &metric.value)?;
            map.insert(metric.id, merged);
        }

        Ok(())
    }

    async fn get(&self, kind: MetricKind, id: &str) -> StorageResult<Option<Metric>> {
        let map = self.metrics.read().await;

        Ok(map
            .get(id)
            .filter(|value| value.kind() == kind)
            .map(|value| Metric {
                id: id.to_string(),
                value: *value,
            }))
    }

    async fn all(&self) -> StorageResult<Vec<Metric>> {
        let map = self.metrics.read().await;

        let mut metrics: Vec<Metric> = map
            .iter()
            .map(|(id, value)| Metric {
                id: id.clone(),
                value: *value,
            })
            .collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(metrics)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus::healthy(
            "In-memory storage operational",
            HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_metrics".to_string(), self.len().await.to_string()),
            ]),
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
