//! Message types for actor communication
//!
//! Commands are sent to a specific actor over its mpsc channel; replies come
//! back on a oneshot channel carried inside the command.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::storage::StorageResult;

/// Commands that can be sent to the SnapshotActor
#[derive(Debug)]
pub enum SnapshotCommand {
    /// Write a snapshot now, outside the regular schedule
    Flush {
        respond_to: oneshot::Sender<StorageResult<usize>>,
    },

    /// Get snapshot statistics
    GetStats {
        respond_to: oneshot::Sender<SnapshotStats>,
    },

    /// Write a final snapshot and stop
    ///
    /// The reply is sent once the final save has finished (or failed).
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Snapshot statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotStats {
    /// Successful snapshot writes
    pub saves: u64,

    /// Failed snapshot writes
    pub failures: u64,

    /// Number of metrics in the most recent successful snapshot
    pub last_saved_metrics: usize,

    /// When the most recent successful snapshot was written
    pub last_saved_at: Option<DateTime<Utc>>,
}
