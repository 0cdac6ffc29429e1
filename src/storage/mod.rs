//! Storage backends for metric state
//!
//! This module provides a trait-based abstraction over the collector's
//! authoritative metric state.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` lets the merge engine stay backend-agnostic
//! - **Async**: all operations are async so handlers never block a worker thread
//! - **Latest value only**: every backend keeps exactly one value per metric id
//!
//! ## Backends
//!
//! - **Snapshot file** (default): in-memory state persisted to a JSON file,
//!   either write-through or on a periodic ticker
//! - **SQLite** (`storage-sqlite` feature): selected when a DSN is configured
//! - **In-Memory**: no persistence, used by the snapshot backend and in tests
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use tally::storage::{self, StorageSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let opened = storage::open(&StorageSettings {
//!         file_storage_path: "data.json".into(),
//!         restore: true,
//!         store_interval: Duration::from_secs(300),
//!         database_dsn: None,
//!     })
//!     .await?;
//!     opened.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod file;
pub mod memory;
pub mod snapshot;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::actors::snapshot::SnapshotHandle;
pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
use file::{FileBackend, Persistence};

/// Resolved persistence settings of the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub file_storage_path: PathBuf,
    pub restore: bool,

    /// Zero selects write-through persistence
    pub store_interval: Duration,

    pub database_dsn: Option<String>,
}

/// A ready backend plus the background snapshot task driving it, if any.
pub struct OpenedStorage {
    pub backend: Arc<dyn StorageBackend>,
    pub snapshots: Option<SnapshotHandle>,
}

impl std::fmt::Debug for OpenedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStorage").finish_non_exhaustive()
    }
}

impl OpenedStorage {
    /// Stop the snapshot task (which writes a final snapshot) and close the backend.
    pub async fn shutdown(self) -> StorageResult<()> {
        if let Some(snapshots) = self.snapshots {
            snapshots.shutdown().await;
        }
        self.backend.close().await
    }
}

/// Open the backend selected by `settings`
///
/// Snapshot restore happens here, before the caller starts serving; a corrupt
/// snapshot or an unreachable database is returned as an error.
pub async fn open(settings: &StorageSettings) -> StorageResult<OpenedStorage> {
    if let Some(dsn) = &settings.database_dsn {
        return open_database(dsn).await;
    }

    let persistence = Persistence::from_interval(settings.store_interval);
    let backend = Arc::new(
        FileBackend::open(&settings.file_storage_path, settings.restore, persistence).await?,
    );

    let snapshots = match persistence {
        Persistence::Periodic(period) => Some(SnapshotHandle::spawn(backend.clone(), period)),
        Persistence::WriteThrough => None,
    };

    info!(
        "using snapshot storage at {}",
        settings.file_storage_path.display()
    );

    Ok(OpenedStorage {
        backend,
        snapshots,
    })
}

#[cfg(feature = "storage-sqlite")]
async fn open_database(dsn: &str) -> StorageResult<OpenedStorage> {
    let backend = sqlite::SqliteBackend::new(dsn).await?;
    info!("using SQLite storage");

    Ok(OpenedStorage {
        backend: Arc::new(backend),
        snapshots: None,
    })
}

#[cfg(not(feature = "storage-sqlite"))]
async fn open_database(_dsn: &str) -> StorageResult<OpenedStorage> {
    Err(StorageError::InvalidConfig(
        "database storage requires the storage-sqlite feature".to_string(),
    ))
}
