//! Per-sampler poll/report loop

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::model::Batch;
use crate::sampler::Sampler;

/// Drive one sampler until `cancel` fires or the queue closes
///
/// Every `poll` the sampler is updated. Once the polled time adds up to at
/// least `report`, a snapshot is pushed onto `queue` and the tally restarts.
/// The push waits for a free worker; batches are never dropped here.
///
/// Updates run on the blocking pool since samplers make system calls.
pub async fn run_sampler<S: Sampler>(
    mut sampler: S,
    poll: Duration,
    report: Duration,
    queue: flume::Sender<Batch>,
    cancel: CancellationToken,
) {
    let name = sampler.name().to_string();
    debug!("starting sampler {name} (poll {poll:?}, report {report:?})");

    let mut elapsed = Duration::ZERO;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll) => {}
        }

        sampler = match tokio::task::spawn_blocking(move || {
            sampler.update();
            sampler
        })
        .await
        {
            Ok(sampler) => sampler,
            Err(e) => {
                error!("sampler {name} update failed: {e}");
                break;
            }
        };
        elapsed += poll;

        if elapsed < report {
            continue;
        }
        elapsed = Duration::ZERO;

        let batch = sampler.snapshot();
        trace!("sampler {name} queueing batch of {}", batch.len());

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = queue.send_async(batch) => {
                if sent.is_err() {
                    debug!("batch queue closed");
                    break;
                }
            }
        }
    }

    debug!("sampler {name} stopped");
}
