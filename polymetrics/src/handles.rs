//! Process-local metric descriptors.
//!
//! Descriptors are thin, stateless handles holding only identity: the
//! family key, the declared label schema, and a cloned storage engine. All
//! sample state lives behind the engine in the shared store, so clones of a
//! handle, and handles registered by entirely different processes, mutate
//! the same logical metric.

use std::sync::Arc;

use crate::common::MetricError;
use crate::storage::StorageEngine;

struct Inner {
    family_key: String,
    help: String,
    label_names: Vec<String>,
    engine: StorageEngine,
}

impl Inner {
    fn check_labels(&self, label_values: &[&str]) -> Result<(), MetricError> {
        if label_values.len() != self.label_names.len() {
            return Err(MetricError::LabelMismatch {
                expected: self.label_names.len(),
                actual: label_values.len(),
            });
        }
        Ok(())
    }
}

/// A gauge: a value that can be set, incremented, and decremented.
#[derive(Clone)]
pub struct Gauge {
    inner: Arc<Inner>,
}

impl Gauge {
    pub(crate) fn new(
        family_key: String,
        help: String,
        label_names: Vec<String>,
        engine: StorageEngine,
    ) -> Gauge {
        Gauge { inner: Arc::new(Inner { family_key, help, label_names, engine }) }
    }

    /// Sets the gauge to `value`, replacing whatever any process stored
    /// before. Concurrent sets race by design; last writer wins.
    pub fn set(&self, value: f64, label_values: &[&str]) -> Result<(), MetricError> {
        self.inner.check_labels(label_values)?;
        self.inner.engine.set_gauge(&self.inner.family_key, label_values, value)?;
        Ok(())
    }

    /// Increments the gauge by one.
    pub fn inc(&self, label_values: &[&str]) -> Result<(), MetricError> {
        self.inc_by(1.0, label_values)
    }

    /// Atomically adds `delta` to the gauge.
    pub fn inc_by(&self, delta: f64, label_values: &[&str]) -> Result<(), MetricError> {
        self.inner.check_labels(label_values)?;
        self.inner.engine.add_gauge(&self.inner.family_key, label_values, delta)?;
        Ok(())
    }

    /// Decrements the gauge by one.
    pub fn dec(&self, label_values: &[&str]) -> Result<(), MetricError> {
        self.dec_by(1.0, label_values)
    }

    /// Atomically subtracts `delta` from the gauge.
    pub fn dec_by(&self, delta: f64, label_values: &[&str]) -> Result<(), MetricError> {
        self.inner.check_labels(label_values)?;
        self.inner.engine.add_gauge(&self.inner.family_key, label_values, -delta)?;
        Ok(())
    }

    /// The family identifier this gauge is exposed under.
    pub fn name(&self) -> &str {
        &self.inner.family_key
    }

    /// The family's help text.
    pub fn help(&self) -> &str {
        &self.inner.help
    }
}

/// A counter: a monotonically increasing running total.
#[derive(Clone)]
pub struct Counter {
    inner: Arc<Inner>,
}

impl Counter {
    pub(crate) fn new(
        family_key: String,
        help: String,
        label_names: Vec<String>,
        engine: StorageEngine,
    ) -> Counter {
        Counter { inner: Arc::new(Inner { family_key, help, label_names, engine }) }
    }

    /// Increments the counter by one.
    pub fn inc(&self, label_values: &[&str]) -> Result<(), MetricError> {
        self.inc_by(1.0, label_values)
    }

    /// Atomically adds `delta` to the counter.
    ///
    /// Counters are monotonic by contract, so a negative delta is rejected
    /// before any store interaction and the stored value stays untouched.
    pub fn inc_by(&self, delta: f64, label_values: &[&str]) -> Result<(), MetricError> {
        if delta < 0.0 {
            return Err(MetricError::NegativeIncrement(delta));
        }
        self.inner.check_labels(label_values)?;
        self.inner.engine.add_counter(&self.inner.family_key, label_values, delta)?;
        Ok(())
    }

    /// The family identifier this counter is exposed under.
    pub fn name(&self) -> &str {
        &self.inner.family_key
    }

    /// The family's help text.
    pub fn help(&self) -> &str {
        &self.inner.help
    }
}

/// A histogram: observations counted into fixed cumulative buckets.
#[derive(Clone)]
pub struct Histogram {
    inner: Arc<Inner>,
    buckets: Arc<[f64]>,
}

impl Histogram {
    pub(crate) fn new(
        family_key: String,
        help: String,
        label_names: Vec<String>,
        engine: StorageEngine,
        buckets: Vec<f64>,
    ) -> Histogram {
        Histogram {
            inner: Arc::new(Inner { family_key, help, label_names, engine }),
            buckets: buckets.into(),
        }
    }

    /// Records one observation.
    ///
    /// Atomically bumps every bucket whose upper boundary is at or above
    /// `value`, then the running count, then the running sum. A step that
    /// fails surfaces as a store error rather than being dropped, so an
    /// undercount is never silent.
    pub fn observe(&self, value: f64, label_values: &[&str]) -> Result<(), MetricError> {
        self.inner.check_labels(label_values)?;
        self.inner.engine.observe_histogram(
            &self.inner.family_key,
            label_values,
            &self.buckets,
            value,
        )?;
        Ok(())
    }

    /// The upper bucket boundaries fixed at registration time.
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// The family identifier this histogram is exposed under.
    pub fn name(&self) -> &str {
        &self.inner.family_key
    }

    /// The family's help text.
    pub fn help(&self) -> &str {
        &self.inner.help
    }

    /// The conventional latency-oriented boundaries used when registration
    /// does not provide any.
    pub fn default_buckets() -> Vec<f64> {
        vec![0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0]
    }
}
