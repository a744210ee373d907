//! The process-local directory of registered metric families.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::common::{MetricError, MetricFamilySamples, MetricKind};
use crate::formatting;
use crate::handles::{Counter, Gauge, Histogram};
use crate::key::{family_key, validate_label_name, validate_metric_name};
use crate::storage::{FamilyMetadata, StorageEngine, Store};

/// A process-local directory of metric descriptors sharing one storage
/// engine.
///
/// Registration is per process: every process registers its own handles at
/// startup while the shared store remains the sole owner of sample state.
/// Collection therefore returns everything present in the store, including
/// families registered only by other processes.
pub struct Registry {
    engine: StorageEngine,
    gauges: IndexMap<String, Gauge>,
    counters: IndexMap<String, Counter>,
    histograms: IndexMap<String, Histogram>,
}

impl Registry {
    /// Creates a registry over `store` with the default key prefix.
    pub fn new(store: Arc<dyn Store>) -> Registry {
        Registry::with_engine(StorageEngine::new(store))
    }

    /// Creates a registry over a preconfigured engine.
    pub fn with_engine(engine: StorageEngine) -> Registry {
        Registry {
            engine,
            gauges: IndexMap::new(),
            counters: IndexMap::new(),
            histograms: IndexMap::new(),
        }
    }

    /// Registers a gauge family and returns its handle.
    ///
    /// Re-registering the same identifier replaces the process-local handle
    /// without touching stored sample values.
    pub fn register_gauge(
        &mut self,
        namespace: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Gauge, MetricError> {
        let (key, labels) =
            self.prepare_family(MetricKind::Gauge, namespace, name, help, label_names, &[])?;
        let gauge = Gauge::new(key.clone(), help.to_string(), labels, self.engine.clone());
        self.gauges.insert(key, gauge.clone());
        Ok(gauge)
    }

    /// Registers a counter family and returns its handle.
    pub fn register_counter(
        &mut self,
        namespace: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Counter, MetricError> {
        let (key, labels) =
            self.prepare_family(MetricKind::Counter, namespace, name, help, label_names, &[])?;
        let counter = Counter::new(key.clone(), help.to_string(), labels, self.engine.clone());
        self.counters.insert(key, counter.clone());
        Ok(counter)
    }

    /// Registers a histogram family and returns its handle.
    ///
    /// `buckets` are the upper boundaries, strictly increasing and finite;
    /// the final `+Inf` boundary is implicit. An empty slice selects
    /// [`Histogram::default_buckets`].
    pub fn register_histogram(
        &mut self,
        namespace: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<Histogram, MetricError> {
        let buckets =
            if buckets.is_empty() { Histogram::default_buckets() } else { buckets.to_vec() };
        validate_buckets(&buckets)?;

        let (key, labels) = self.prepare_family(
            MetricKind::Histogram,
            namespace,
            name,
            help,
            label_names,
            &buckets,
        )?;
        let histogram =
            Histogram::new(key.clone(), help.to_string(), labels, self.engine.clone(), buckets);
        self.histograms.insert(key, histogram.clone());
        Ok(histogram)
    }

    /// Returns the gauge registered in this process under `(namespace, name)`.
    pub fn get_gauge(&self, namespace: &str, name: &str) -> Result<Gauge, MetricError> {
        let key = family_key(namespace, name);
        self.gauges.get(&key).cloned().ok_or(MetricError::Unregistered(key))
    }

    /// Returns the counter registered in this process under `(namespace, name)`.
    pub fn get_counter(&self, namespace: &str, name: &str) -> Result<Counter, MetricError> {
        let key = family_key(namespace, name);
        self.counters.get(&key).cloned().ok_or(MetricError::Unregistered(key))
    }

    /// Returns the histogram registered in this process under `(namespace, name)`.
    pub fn get_histogram(&self, namespace: &str, name: &str) -> Result<Histogram, MetricError> {
        let key = family_key(namespace, name);
        self.histograms.get(&key).cloned().ok_or(MetricError::Unregistered(key))
    }

    /// Collects every family currently present in the shared store.
    ///
    /// Read-only with respect to the store and safe to run concurrently
    /// with in-flight mutations; the result is eventually consistent across
    /// keys rather than a point-in-time snapshot. Families nothing has ever
    /// observed have no stored keys and are absent from the result.
    pub fn collect(&self) -> Result<Vec<MetricFamilySamples>, MetricError> {
        let mut families = self.engine.fetch_gauges()?;
        families.extend(self.engine.fetch_counters()?);
        families.extend(self.engine.fetch_histograms()?);
        Ok(families)
    }

    /// Renders the [`collect`](Registry::collect) output as exposition text.
    pub fn to_text(&self) -> Result<String, MetricError> {
        Ok(formatting::render(&self.collect()?))
    }

    /// The storage engine backing this registry.
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    fn prepare_family(
        &self,
        kind: MetricKind,
        namespace: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
        buckets: &[f64],
    ) -> Result<(String, Vec<String>), MetricError> {
        validate_metric_name(namespace)?;
        validate_metric_name(name)?;
        for label in label_names {
            validate_label_name(label)?;
        }

        let key = family_key(namespace, name);
        let labels: Vec<String> = label_names.iter().map(|l| l.to_string()).collect();
        self.engine.write_metadata(
            kind,
            &key,
            &FamilyMetadata {
                help: help.to_string(),
                label_names: labels.clone(),
                buckets: buckets.to_vec(),
            },
        )?;
        Ok((key, labels))
    }
}

fn validate_buckets(buckets: &[f64]) -> Result<(), MetricError> {
    let increasing = buckets.windows(2).all(|pair| pair[0] < pair[1]);
    if buckets.is_empty() || !increasing || buckets.iter().any(|b| !b.is_finite()) {
        return Err(MetricError::InvalidBuckets);
    }
    Ok(())
}
