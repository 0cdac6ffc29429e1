//! Agent dispatcher
//!
//! ```text
//!  sampler loop ──┐                         ┌── worker 1 ──┐
//!  sampler loop ──┼──► rendezvous queue ────┼── worker 2 ──┼──► DeliveryTransport
//!       ...       ┘     (flume, cap 0)      └── worker N ──┘
//! ```
//!
//! One task per sampler, `rate_limit` sender workers. The queue has no
//! buffer: a sampler hands its batch directly to an idle worker and waits
//! while all workers are busy. That wait is the agent's only backpressure.
//!
//! Every task observes one [`CancellationToken`]; [`DispatcherHandle::shutdown`]
//! cancels it and waits for all tasks to finish.

pub mod sampling;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::Batch;
use crate::sampler::Sampler;
use crate::transport::DeliveryTransport;
pub use worker::DeliveryStats;

/// Timing and concurrency of the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub poll_interval: Duration,
    pub report_interval: Duration,

    /// Number of concurrent sender workers
    pub rate_limit: usize,
}

pub struct Dispatcher {
    settings: DispatchSettings,
    samplers: Vec<Box<dyn Sampler>>,
    transport: DeliveryTransport,
}

impl Dispatcher {
    pub fn new(settings: DispatchSettings, transport: DeliveryTransport) -> Self {
        Self {
            settings,
            samplers: Vec::new(),
            transport,
        }
    }

    pub fn with_sampler(mut self, sampler: impl Sampler) -> Self {
        self.samplers.push(Box::new(sampler));
        self
    }

    /// Spawn every sampler loop and sender worker.
    pub fn start(self) -> DispatcherHandle {
        let Dispatcher {
            settings,
            samplers,
            transport,
        } = self;

        let workers = settings.rate_limit.max(1);
        if workers != settings.rate_limit {
            warn!("rate limit of 0 raised to 1 worker");
        }

        let cancel = CancellationToken::new();
        let stats = Arc::new(DeliveryStats::default());
        let (tx, rx) = flume::bounded::<Batch>(0);
        let mut tasks = Vec::with_capacity(samplers.len() + workers);

        for id in 1..=workers {
            tasks.push(tokio::spawn(worker::run_worker(
                id,
                transport.clone(),
                rx.clone(),
                stats.clone(),
                cancel.clone(),
            )));
        }

        for sampler in samplers {
            tasks.push(tokio::spawn(sampling::run_sampler(
                sampler,
                settings.poll_interval,
                settings.report_interval,
                tx.clone(),
                cancel.clone(),
            )));
        }

        info!(
            "dispatcher started: {} samplers, {workers} workers, sending to {}",
            tasks.len() - workers,
            transport.endpoint()
        );

        DispatcherHandle {
            cancel,
            stats,
            tasks,
        }
    }
}

/// Running dispatcher
pub struct DispatcherHandle {
    cancel: CancellationToken,
    stats: Arc<DeliveryStats>,
    tasks: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Token observed by every sampler and worker
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all loops and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                warn!("dispatcher task ended abnormally: {e}");
            }
        }

        info!(
            "dispatcher stopped ({} batches delivered, {} dropped)",
            self.stats.delivered(),
            self.stats.failed()
        );
    }
}
