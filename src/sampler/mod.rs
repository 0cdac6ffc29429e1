//! Metric samplers
//!
//! A sampler refreshes its readings on every poll tick ([`Sampler::update`])
//! and turns them into a [`Batch`] on every report tick
//! ([`Sampler::snapshot`]). The dispatcher drives every sampler the same way
//! and never looks inside one.
//!
//! Readings are gauges, except counters that carry what accumulated since the
//! previous snapshot. Since the collector sums counter deltas, its stored value
//! is the running total.

pub mod host;
pub mod runtime;

pub use host::HostSampler;
pub use runtime::RuntimeSampler;

use crate::model::{Batch, Metric, MetricValue};

pub trait Sampler: Send + 'static {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Refresh internal readings. May block briefly on system calls.
    fn update(&mut self);

    /// Current readings as a batch; resets counters accumulated since the last call.
    fn snapshot(&mut self) -> Batch;
}

impl Sampler for Box<dyn Sampler> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn update(&mut self) {
        (**self).update()
    }

    fn snapshot(&mut self) -> Batch {
        (**self).snapshot()
    }
}

/// Append a gauge, skipping readings that JSON cannot carry.
fn push_gauge(batch: &mut Batch, id: &str, value: f64) {
    if value.is_finite() {
        batch.push(Metric::named(id, MetricValue::Gauge(value)));
    } else {
        tracing::trace!("dropping non-finite reading for {id}");
    }
}

fn push_counter(batch: &mut Batch, id: &str, delta: u64) {
    let delta = i64::try_from(delta).unwrap_or(i64::MAX);
    batch.push(Metric::named(id, MetricValue::Counter(delta)));
}
