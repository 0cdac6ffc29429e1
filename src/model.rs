//! Metric vocabulary shared by the agent and the collector
//!
//! A [`Metric`] is an id plus a tagged [`MetricValue`]. On the wire (and in the
//! snapshot file) it is the flat record
//!
//! ```text
//! {"id": "hits", "type": "counter", "delta": 5}
//! {"id": "Alloc", "type": "gauge", "value": 1024.0}
//! ```
//!
//! with exactly one of `delta`/`value` present, matching `type`. Records that
//! break that rule never become a `Metric`: the check happens during
//! deserialization, so nothing downstream has to re-validate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One sampling tick's worth of metric updates, in emission order.
pub type Batch = Vec<Metric>;

/// The two metric kinds understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last reported absolute reading wins.
    Gauge,

    /// Running sum of reported deltas.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}

/// A metric payload: an absolute gauge reading or a counter increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),

    /// For updates this is the increment to apply; for stored state it is the
    /// accumulated total.
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse a path-encoded value (`/update/{type}/{name}/{value}`) for `kind`.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self, ModelError> {
        match kind {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(|| ModelError::InvalidValue {
                    kind,
                    raw: raw.to_string(),
                }),
            MetricKind::Counter => {
                raw.parse::<i64>()
                    .map(MetricValue::Counter)
                    .map_err(|_| ModelError::InvalidValue {
                        kind,
                        raw: raw.to_string(),
                    })
            }
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(value) => write!(f, "{value}"),
            MetricValue::Counter(delta) => write!(f, "{delta}"),
        }
    }
}

/// A single metric update (or stored state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricRecord", into = "MetricRecord")]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    /// Build a metric, rejecting empty ids.
    pub fn new(id: impl Into<String>, value: MetricValue) -> Result<Self, ModelError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ModelError::EmptyId);
        }
        Ok(Self { id, value })
    }

    /// Infallible constructor for sampler-generated names.
    pub(crate) fn named(id: &str, value: MetricValue) -> Self {
        Self {
            id: id.to_string(),
            value,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Result<Self, ModelError> {
        Self::new(id, MetricValue::Gauge(value))
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Result<Self, ModelError> {
        Self::new(id, MetricValue::Counter(delta))
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Flat wire representation of a [`Metric`].
///
/// Also used on its own for `POST /value/` lookups, where only `id` and
/// `type` are meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MetricKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl TryFrom<MetricRecord> for Metric {
    type Error = ModelError;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        let value = match (record.kind, record.delta, record.value) {
            (MetricKind::Counter, Some(delta), None) => MetricValue::Counter(delta),
            (MetricKind::Gauge, None, Some(value)) => MetricValue::Gauge(value),
            (kind, _, _) => {
                return Err(ModelError::MismatchedPayload {
                    id: record.id,
                    kind,
                });
            }
        };

        Metric::new(record.id, value)
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Counter(delta) => (Some(delta), None),
            MetricValue::Gauge(value) => (None, Some(value)),
        };

        MetricRecord {
            id: metric.id,
            kind: metric.value.kind(),
            delta,
            value,
        }
    }
}

/// Id + kind pair naming a metric in read requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricQuery {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MetricKind,
}

/// Errors raised while building metrics from untrusted input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("metric id must not be empty")]
    EmptyId,

    #[error("unknown metric type: {0:?}")]
    UnknownKind(String),

    #[error("value {raw:?} is not a valid {kind}")]
    InvalidValue { kind: MetricKind, raw: String },

    #[error("metric {id:?} of type {kind} must carry exactly the matching delta/value field")]
    MismatchedPayload { id: String, kind: MetricKind },
}
