use std::io;

use thiserror::Error as ThisError;

/// The type of a metric family.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricKind {
    /// A monotonically increasing running total.
    Counter,
    /// A value that can be set, incremented, and decremented arbitrarily.
    Gauge,
    /// Observations counted into fixed cumulative buckets.
    Histogram,
}

impl MetricKind {
    /// The type tag emitted on `# TYPE` lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }

    /// The single-character tag used in stored keys.
    pub(crate) fn key_tag(&self) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Gauge => "g",
            MetricKind::Histogram => "h",
        }
    }
}

/// One concrete time series: a label-value assignment plus its current value.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// The name this sample is exposed under, including any `_bucket`,
    /// `_sum`, or `_count` suffix synthesized at collection time.
    pub name: String,
    /// Labels specific to this sample, appended after the family's labels.
    /// Empty for plain samples; `["le"]` for histogram bucket samples.
    pub label_names: Vec<String>,
    /// Values for the family's labels in declaration order, followed by
    /// values for `label_names`.
    pub label_values: Vec<String>,
    /// The current aggregated value.
    pub value: f64,
}

/// A metric family together with every sample collected for it.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricFamilySamples {
    /// The family identifier, exposed as the metric name.
    pub name: String,
    /// Help text shown on the `# HELP` line.
    pub help: String,
    /// The family's type.
    pub kind: MetricKind,
    /// Declared label names, in order.
    pub label_names: Vec<String>,
    /// Collected samples, ordered by label-value tuple.
    pub samples: Vec<Sample>,
}

/// Errors surfaced by the shared store backing a registry.
#[derive(Debug, ThisError)]
pub enum StoreError {
    /// The store could not be reached, or an operation against it timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Talking to the store failed at the transport level.
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors returned by registration, mutation, and collection calls.
#[derive(Debug, ThisError)]
pub enum MetricError {
    /// A metric or namespace name does not match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),

    /// A label name does not match `[a-zA-Z_][a-zA-Z0-9_]*`.
    #[error("invalid label name: {0:?}")]
    InvalidLabelName(String),

    /// A label name is reserved for internal use.
    #[error("label name {0:?} is reserved")]
    ReservedLabelName(String),

    /// A mutation passed a different number of label values than the family
    /// declared label names.
    #[error("expected {expected} label value(s), got {actual}")]
    LabelMismatch {
        /// Number of label names the family declared.
        expected: usize,
        /// Number of label values the mutation passed.
        actual: usize,
    },

    /// A counter was asked to move backwards.
    #[error("counter increment must be non-negative, got {0}")]
    NegativeIncrement(f64),

    /// Histogram bucket boundaries were empty, non-finite, or not strictly
    /// increasing.
    #[error("histogram buckets must be finite and strictly increasing")]
    InvalidBuckets,

    /// A lookup for a metric never registered in this process.
    #[error("no metric registered under {0:?}")]
    Unregistered(String),

    /// The shared store failed underneath a mutation or collection call.
    #[error(transparent)]
    Store(#[from] StoreError),
}
