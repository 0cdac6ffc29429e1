//! SnapshotActor - periodically persists the collector's metric state
//!
//! ## Architecture
//!
//! Runs only when the collector uses periodic persistence. Every period the
//! actor asks the [`FileBackend`] to rewrite its snapshot file; between ticks
//! updates only touch memory, so a crash loses what arrived since the last
//! tick.
//!
//! A failed save is logged, counted and retried on the next tick. It never
//! stops the actor. On shutdown the actor writes one last snapshot before
//! exiting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{SnapshotCommand, SnapshotStats};
use crate::storage::StorageResult;
use crate::storage::file::FileBackend;

pub struct SnapshotActor {
    backend: Arc<FileBackend>,
    period: Duration,
    command_rx: mpsc::Receiver<SnapshotCommand>,
    stats: SnapshotStats,
}

impl SnapshotActor {
    pub fn new(
        backend: Arc<FileBackend>,
        period: Duration,
        command_rx: mpsc::Receiver<SnapshotCommand>,
    ) -> Self {
        Self {
            backend,
            period,
            command_rx,
            stats: SnapshotStats::default(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(path = %self.backend.path().display()))]
    pub async fn run(mut self) {
        debug!("starting snapshot actor (period: {:?})", self.period);

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    trace!("periodic snapshot triggered");
                    let _ = self.save().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SnapshotCommand::Flush { respond_to }) => {
                            debug!("manual snapshot requested");
                            let result = self.save().await;
                            let _ = respond_to.send(result);
                        }
                        Some(SnapshotCommand::GetStats { respond_to }) => {
                            let _ = respond_to.send(self.stats.clone());
                        }
                        Some(SnapshotCommand::Shutdown { respond_to }) => {
                            info!("snapshot actor shutting down, writing final snapshot");
                            let _ = self.save().await;
                            let _ = respond_to.send(());
                            break;
                        }
                        None => {
                            warn!("all snapshot handles dropped, writing final snapshot");
                            let _ = self.save().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("snapshot actor stopped");
    }

    async fn save(&mut self) -> StorageResult<usize> {
        match self.backend.save().await {
            Ok(count) => {
                self.stats.saves += 1;
                self.stats.last_saved_metrics = count;
                self.stats.last_saved_at = Some(Utc::now());
                trace!("snapshot #{} written ({count} metrics)", self.stats.saves);
                Ok(count)
            }
            Err(e) => {
                self.stats.failures += 1;
                error!("failed to write snapshot: {e}");
                Err(e)
            }
        }
    }
}

/// Handle for controlling the SnapshotActor
#[derive(Clone)]
pub struct SnapshotHandle {
    sender: mpsc::Sender<SnapshotCommand>,
}

impl SnapshotHandle {
    /// Spawn a snapshot actor writing `backend`'s state every `period`.
    pub fn spawn(backend: Arc<FileBackend>, period: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let actor = SnapshotActor::new(backend, period, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Write a snapshot now and return how many metrics it holds
    pub async fn flush(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SnapshotCommand::Flush { respond_to: tx })
            .await?;

        Ok(rx.await??)
    }

    /// Get snapshot statistics
    pub async fn stats(&self) -> Option<SnapshotStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SnapshotCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Write a final snapshot and stop the actor
    ///
    /// Returns once the final save has completed. Calling it on an already
    /// stopped actor is a no-op.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SnapshotCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
