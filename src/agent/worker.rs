//! Sender workers: pull batches off the queue and deliver them

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::model::Batch;
use crate::transport::DeliveryTransport;

/// Delivery outcomes shared by all workers of a dispatcher
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Deliver batches until `cancel` fires or every sampler is gone
///
/// A batch that still fails after the transport's retries is logged and
/// dropped; the worker moves on to the next one.
#[instrument(skip_all, fields(worker = id))]
pub async fn run_worker(
    id: usize,
    transport: DeliveryTransport,
    queue: flume::Receiver<Batch>,
    stats: Arc<DeliveryStats>,
    cancel: CancellationToken,
) {
    debug!("sender worker started");

    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            batch = queue.recv_async() => match batch {
                Ok(batch) => batch,
                Err(_) => {
                    debug!("batch queue closed");
                    break;
                }
            },
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("abandoning in-flight batch of {} metrics", batch.len());
                break;
            }
            result = transport.deliver(&batch) => match result {
                Ok(()) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!("dropping batch of {} metrics: {e}", batch.len());
                }
            },
        }
    }

    debug!("sender worker stopped");
}
