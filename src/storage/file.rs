//! Snapshot-backed storage: in-memory state plus a snapshot file
//!
//! Two persistence disciplines, picked once at construction:
//!
//! - **Write-through** (`store_interval == 0`): every successful update
//!   rewrites the snapshot before the request completes. Nothing acknowledged
//!   is lost on a crash; each write pays for a full file rewrite.
//! - **Periodic**: updates only touch memory; the snapshot actor
//!   ([`crate::actors::snapshot`]) calls [`FileBackend::save`] on its ticker.
//!   Updates made since the last tick are lost if the process crashes.
//!
//! Saves are serialized by an internal mutex and capture the state only after
//! acquiring it, so the last save to finish always carries the newest state.
//! A write-through update holds the same mutex across its save and is rolled
//! back when the save fails, so a refused update never shows up later.
//!
//! Once [`StorageBackend::close`] has written the final snapshot, further
//! updates fail with [`StorageError::Closed`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::memory::MemoryBackend;
use super::snapshot::SnapshotFile;
use crate::model::{Batch, Metric, MetricKind};

/// When the snapshot file gets rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// After every successful update
    WriteThrough,

    /// On a background ticker with this period
    Periodic(Duration),
}

impl Persistence {
    /// Zero means write-through, anything else is the ticker period.
    pub fn from_interval(interval: Duration) -> Self {
        if interval.is_zero() {
            Persistence::WriteThrough
        } else {
            Persistence::Periodic(interval)
        }
    }
}

pub struct FileBackend {
    memory: MemoryBackend,
    snapshot: SnapshotFile,
    persistence: Persistence,
    save_lock: Mutex<()>,
    /// Updates hold a read guard, `close` takes the write guard
    closed: RwLock<bool>,
}

impl FileBackend {
    /// Open the backend, seeding it from the snapshot when `restore` is set
    ///
    /// A corrupt snapshot fails the call; the collector must not start
    /// serving from an inconsistent state.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(
        path: impl AsRef<Path>,
        restore: bool,
        persistence: Persistence,
    ) -> StorageResult<Self> {
        let snapshot = SnapshotFile::new(path.as_ref());
        let memory = MemoryBackend::new();

        if restore {
            let metrics = snapshot.load().await?;
            info!("restoring {} metrics from snapshot", metrics.len());
            memory.restore(metrics).await;
        }

        debug!("snapshot persistence: {persistence:?}");

        Ok(Self {
            memory,
            snapshot,
            persistence,
            save_lock: Mutex::new(()),
            closed: RwLock::new(false),
        })
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    pub fn path(&self) -> PathBuf {
        self.snapshot.path().to_path_buf()
    }

    /// Write the full current state to the snapshot file.
    pub async fn save(&self) -> StorageResult<usize> {
        let _guard = self.save_lock.lock().await;
        self.write_snapshot().await
    }

    /// Caller holds `save_lock`.
    async fn write_snapshot(&self) -> StorageResult<usize> {
        let metrics = self.memory.all().await?;
        self.snapshot.save(&metrics).await?;
        Ok(metrics.len())
    }

    /// Apply `batch` and persist it, or leave no trace of it
    ///
    /// Returns the stored state of the batch's last entry.
    async fn write_through(&self, batch: Batch) -> StorageResult<Option<Metric>> {
        let _guard = self.save_lock.lock().await;
        let checkpoint = self
            .memory
            .checkpoint(batch.iter().map(|metric| metric.id.as_str()))
            .await;
        let last = batch.last().map(|metric| (metric.kind(), metric.id.clone()));

        // entries before a failing one stay applied and are persisted
        let result = self.memory.apply_batch(batch).await;

        if let Err(err) = self.write_snapshot().await {
            warn!("snapshot write failed, rolling back update: {err}");
            self.memory.rollback(checkpoint).await;
            return Err(err);
        }
        result?;

        match last {
            Some((kind, id)) => self.memory.get(kind, &id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn apply(&self, metric: Metric) -> StorageResult<Metric> {
        let closed = self.closed.read().await;
        if *closed {
            return Err(StorageError::Closed);
        }

        match self.persistence {
            Persistence::Periodic(_) => self.memory.apply(metric).await,
            Persistence::WriteThrough => {
                let id = metric.id.clone();
                self.write_through(vec![metric])
                    .await?
                    .ok_or_else(|| StorageError::QueryFailed(format!("{id} missing after update")))
            }
        }
    }

    async fn apply_batch(&self, batch: Batch) -> StorageResult<()> {
        let closed = self.closed.read().await;
        if *closed {
            return Err(StorageError::Closed);
        }

        match self.persistence {
            Persistence::Periodic(_) => self.memory.apply_batch(batch).await,
            Persistence::WriteThrough => self.write_through(batch).await.map(|_| ()),
        }
    }

    async fn get(&self, kind: MetricKind, id: &str) -> StorageResult<Option<Metric>> {
        self.memory.get(kind, id).await
    }

    async fn all(&self) -> StorageResult<Vec<Metric>> {
        self.memory.all().await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus::healthy(
            "Snapshot-backed storage operational",
            HashMap::from([
                ("backend".to_string(), "file".to_string()),
                (
                    "snapshot_path".to_string(),
                    self.snapshot.path().display().to_string(),
                ),
                ("total_metrics".to_string(), self.memory.len().await.to_string()),
            ]),
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        let mut closed = self.closed.write().await;
        *closed = true;
        let saved = self.save().await?;
        info!("saved {saved} metrics before closing snapshot backend");
        Ok(())
    }
}
