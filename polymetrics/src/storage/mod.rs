//! The aggregation core: atomic mutation primitives against a shared
//! key-value store, and the collection routine that regroups the flat key
//! space back into per-family sample sets.
//!
//! Every logical counter lives at its own key, every mutation maps onto
//! exactly one atomic store primitive, and increments commute, so the
//! protocol needs no locks, leases, or transactions. Collection scans are
//! read-only and may interleave with any number of in-flight mutations;
//! they are eventually consistent across keys rather than point-in-time
//! snapshots, but can never tear an individual counter.

mod memory;
pub use self::memory::MemoryStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::common::{MetricFamilySamples, MetricKind, Sample, StoreError};
use crate::key::{decode_label_values, sample_key};

/// Default namespace prefix for every key written to the shared store.
pub const DEFAULT_KEY_PREFIX: &str = "prom";

/// The narrow contract a shared store must satisfy.
///
/// The engine never performs read-modify-write cycles of its own: each of
/// these primitives must be applied atomically by the store, and that is the
/// entire concurrency story. Values are stored as strings and interpreted
/// numerically by [`incr_by`](Store::incr_by), matching the string/number
/// duality of the usual key-value stores.
///
/// Implementations must report unreachable or timed-out operations as
/// [`StoreError`]s; a silently dropped increment is permanently lost with no
/// way to detect or repair the undercount.
pub trait Store: Send + Sync {
    /// Atomically replaces the value at `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Atomically adds `delta` to the numeric value at `key`, treating a
    /// missing key as zero, and returns the updated value.
    fn incr_by(&self, key: &str, delta: f64) -> Result<f64, StoreError>;

    /// Reads the value at `key`, if present.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Returns every `(key, value)` pair whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;
}

/// Per-family metadata record, written once at registration time.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct FamilyMetadata {
    pub help: String,
    pub label_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<f64>,
}

/// Translates descriptor mutations into single atomic store operations and
/// regroups the stored key space at collection time.
#[derive(Clone)]
pub struct StorageEngine {
    store: Arc<dyn Store>,
    prefix: String,
}

impl StorageEngine {
    /// Creates an engine over `store` using [`DEFAULT_KEY_PREFIX`].
    pub fn new(store: Arc<dyn Store>) -> StorageEngine {
        StorageEngine::with_prefix(store, DEFAULT_KEY_PREFIX)
    }

    /// Creates an engine whose keys all live under `prefix`, so independent
    /// deployments can share one store without colliding.
    pub fn with_prefix(store: Arc<dyn Store>, prefix: impl Into<String>) -> StorageEngine {
        StorageEngine { store, prefix: prefix.into() }
    }

    fn scalar_key(&self, kind: MetricKind, family_key: &str, label_values: &[&str]) -> String {
        format!("{}:{}:{}", self.prefix, kind.key_tag(), sample_key(family_key, label_values))
    }

    fn scan_prefix_for(&self, kind: MetricKind) -> String {
        format!("{}:{}:", self.prefix, kind.key_tag())
    }

    fn meta_key(&self, kind: MetricKind, family_key: &str) -> String {
        format!("{}:meta:{}:{}", self.prefix, kind.key_tag(), family_key)
    }

    /// Last-write-wins overwrite of a gauge sample.
    pub fn set_gauge(
        &self,
        family_key: &str,
        label_values: &[&str],
        value: f64,
    ) -> Result<(), StoreError> {
        let key = self.scalar_key(MetricKind::Gauge, family_key, label_values);
        self.store.set(&key, &value.to_string())
    }

    /// Atomic delta against a gauge sample. Concurrent deltas from other
    /// processes are never lost, unlike caller-side read-modify-write.
    pub fn add_gauge(
        &self,
        family_key: &str,
        label_values: &[&str],
        delta: f64,
    ) -> Result<(), StoreError> {
        let key = self.scalar_key(MetricKind::Gauge, family_key, label_values);
        self.store.incr_by(&key, delta).map(|_| ())
    }

    /// Atomic add to a counter's running total.
    pub fn add_counter(
        &self,
        family_key: &str,
        label_values: &[&str],
        delta: f64,
    ) -> Result<(), StoreError> {
        let key = self.scalar_key(MetricKind::Counter, family_key, label_values);
        self.store.incr_by(&key, delta).map(|_| ())
    }

    /// Records one histogram observation: the bucket counter for every
    /// boundary at or above `value`, then the running count, then the
    /// running sum. Each step is one atomic increment, so a concurrent
    /// collector may observe a partially applied observation but never a
    /// torn individual counter.
    pub fn observe_histogram(
        &self,
        family_key: &str,
        label_values: &[&str],
        buckets: &[f64],
        value: f64,
    ) -> Result<(), StoreError> {
        let base = self.scalar_key(MetricKind::Histogram, family_key, label_values);
        for bound in buckets.iter().filter(|bound| value <= **bound) {
            self.store.incr_by(&format!("{base}:b:{bound}"), 1.0)?;
        }
        self.store.incr_by(&format!("{base}:count"), 1.0)?;
        self.store.incr_by(&format!("{base}:sum"), value)?;
        Ok(())
    }

    /// Writes the family metadata record. Called once per family at
    /// registration time; sample keys stay metadata-free.
    pub(crate) fn write_metadata(
        &self,
        kind: MetricKind,
        family_key: &str,
        meta: &FamilyMetadata,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(meta).expect("metadata always serializes");
        self.store.set(&self.meta_key(kind, family_key), &payload)
    }

    fn read_metadata(
        &self,
        kind: MetricKind,
        family_key: &str,
    ) -> Result<Option<FamilyMetadata>, StoreError> {
        match self.store.get(&self.meta_key(kind, family_key))? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(meta) => Ok(Some(meta)),
                Err(_) => {
                    warn!(family = %family_key, "ignoring unreadable metadata record");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Fetches and regroups every stored gauge sample.
    pub fn fetch_gauges(&self) -> Result<Vec<MetricFamilySamples>, StoreError> {
        self.fetch_scalars(MetricKind::Gauge)
    }

    /// Fetches and regroups every stored counter sample.
    pub fn fetch_counters(&self) -> Result<Vec<MetricFamilySamples>, StoreError> {
        self.fetch_scalars(MetricKind::Counter)
    }

    fn fetch_scalars(&self, kind: MetricKind) -> Result<Vec<MetricFamilySamples>, StoreError> {
        let prefix = self.scan_prefix_for(kind);
        let mut families: IndexMap<String, Vec<(Vec<String>, f64)>> = IndexMap::new();

        for (key, raw) in self.store.scan_prefix(&prefix)? {
            let rest = &key[prefix.len()..];
            let Some((family, values)) = parse_scalar_key(rest) else {
                warn!(key = %key, "skipping malformed sample key");
                continue;
            };
            let Ok(value) = raw.parse::<f64>() else {
                warn!(key = %key, "skipping sample with non-numeric value");
                continue;
            };
            families.entry(family.to_string()).or_default().push((values, value));
        }

        let mut out = Vec::new();
        for (family, mut rows) in families {
            let Some(meta) = self.read_metadata(kind, &family)? else {
                debug!(family = %family, "stored samples without metadata; skipping family");
                continue;
            };
            rows.retain(|(values, _)| {
                let matches = values.len() == meta.label_names.len();
                if !matches {
                    warn!(family = %family, "skipping sample with mismatched label arity");
                }
                matches
            });
            if rows.is_empty() {
                continue;
            }
            rows.sort_by(|a, b| a.0.cmp(&b.0));

            let samples = rows
                .into_iter()
                .map(|(label_values, value)| Sample {
                    name: family.clone(),
                    label_names: Vec::new(),
                    label_values,
                    value,
                })
                .collect();
            out.push(MetricFamilySamples {
                name: family,
                help: meta.help,
                kind,
                label_names: meta.label_names,
                samples,
            });
        }
        Ok(out)
    }

    /// Fetches and regroups every stored histogram series, synthesizing the
    /// cumulative bucket samples in ascending boundary order terminated by
    /// `+Inf`, plus the `_sum` and `_count` pseudo-samples.
    pub fn fetch_histograms(&self) -> Result<Vec<MetricFamilySamples>, StoreError> {
        let prefix = self.scan_prefix_for(MetricKind::Histogram);
        let mut families: IndexMap<String, BTreeMap<Vec<String>, SeriesAccumulator>> =
            IndexMap::new();

        for (key, raw) in self.store.scan_prefix(&prefix)? {
            let rest = &key[prefix.len()..];
            let Some((family, values, part)) = parse_histogram_key(rest) else {
                warn!(key = %key, "skipping malformed histogram key");
                continue;
            };
            let Ok(value) = raw.parse::<f64>() else {
                warn!(key = %key, "skipping histogram entry with non-numeric value");
                continue;
            };

            let series = families.entry(family.to_string()).or_default().entry(values).or_default();
            match part {
                HistogramPart::Sum => series.sum = value,
                HistogramPart::Count => series.count = value,
                HistogramPart::Bucket(bound) => {
                    series.buckets.insert(bound, value);
                }
            }
        }

        let mut out = Vec::new();
        for (family, rows) in families {
            let Some(meta) = self.read_metadata(MetricKind::Histogram, &family)? else {
                debug!(family = %family, "stored samples without metadata; skipping family");
                continue;
            };

            let mut samples = Vec::new();
            for (label_values, series) in rows {
                if label_values.len() != meta.label_names.len() {
                    warn!(family = %family, "skipping series with mismatched label arity");
                    continue;
                }

                for bound in &meta.buckets {
                    let rendered = bound.to_string();
                    let count = series.buckets.get(&rendered).copied().unwrap_or_default();
                    samples.push(bucket_sample(&family, &label_values, rendered, count));
                }
                samples.push(bucket_sample(
                    &family,
                    &label_values,
                    "+Inf".to_string(),
                    series.count,
                ));
                samples.push(Sample {
                    name: format!("{family}_sum"),
                    label_names: Vec::new(),
                    label_values: label_values.clone(),
                    value: series.sum,
                });
                samples.push(Sample {
                    name: format!("{family}_count"),
                    label_names: Vec::new(),
                    label_values,
                    value: series.count,
                });
            }
            if samples.is_empty() {
                continue;
            }
            out.push(MetricFamilySamples {
                name: family,
                help: meta.help,
                kind: MetricKind::Histogram,
                label_names: meta.label_names,
                samples,
            });
        }
        Ok(out)
    }
}

#[derive(Default)]
struct SeriesAccumulator {
    sum: f64,
    count: f64,
    // Keyed by the boundary's key segment so lookups match exactly what the
    // mutation path wrote, with no float re-parsing in between.
    buckets: BTreeMap<String, f64>,
}

fn bucket_sample(family: &str, label_values: &[String], le: String, value: f64) -> Sample {
    let mut values = label_values.to_vec();
    values.push(le);
    Sample {
        name: format!("{family}_bucket"),
        label_names: vec!["le".to_string()],
        label_values: values,
        value,
    }
}

// Sample keys are parsed right-anchored: the family identifier may itself
// contain `:` (the name grammar allows it), while the tail segments (base64,
// `sum`, `count`, `b`, a rendered boundary) never can.
fn parse_scalar_key(rest: &str) -> Option<(&str, Vec<String>)> {
    let (family, segment) = rest.rsplit_once(':')?;
    if family.is_empty() {
        return None;
    }
    let values = decode_label_values(segment)?;
    Some((family, values))
}

enum HistogramPart {
    Sum,
    Count,
    Bucket(String),
}

fn parse_histogram_key(rest: &str) -> Option<(&str, Vec<String>, HistogramPart)> {
    let (head, tail) = rest.rsplit_once(':')?;
    match tail {
        "sum" => {
            let (family, values) = parse_scalar_key(head)?;
            Some((family, values, HistogramPart::Sum))
        }
        "count" => {
            let (family, values) = parse_scalar_key(head)?;
            Some((family, values, HistogramPart::Count))
        }
        bound => {
            bound.parse::<f64>().ok()?;
            let head = head.strip_suffix(":b")?;
            let (family, values) = parse_scalar_key(head)?;
            Some((family, values, HistogramPart::Bucket(bound.to_string())))
        }
    }
}
