//! tally: a small metrics pipeline
//!
//! The **agent** samples its host on a poll tick, ships accumulated batches
//! to a collector on a report tick, and the **collector** merges them into
//! one latest-value store: counters accumulate, gauges are replaced.
//!
//! - [`sampler`], [`agent`] and [`transport`] make up the agent side
//! - [`api`], [`merge`] and [`storage`] make up the collector side
//! - [`model`] is the wire and storage vocabulary both sides share

pub mod actors;
pub mod agent;
pub mod api;
pub mod config;
pub mod merge;
pub mod model;
pub mod retry;
pub mod sampler;
pub mod storage;
pub mod transport;
pub mod util;

pub use model::{Batch, Metric, MetricKind, MetricValue};
