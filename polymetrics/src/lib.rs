//! Metrics shared across short-lived processes through an external
//! key-value store, rendered in the Prometheus exposition format.
//!
//! Many independent processes (one per web request, say) mutate the same
//! logical metric concurrently, with a shared store as the only
//! coordination point. Each mutation maps onto a single atomic store
//! primitive, so increments from different processes commute and are never
//! lost; a separate collection path scans the flat key space, regroups it
//! into per-family sample sets, and renders them as exposition text.
//!
//! ```
//! use std::sync::Arc;
//! use polymetrics::{MemoryStore, Registry};
//!
//! # fn main() -> Result<(), polymetrics::MetricError> {
//! let mut registry = Registry::new(Arc::new(MemoryStore::new()));
//!
//! let requests =
//!     registry.register_counter("app", "requests_total", "Requests served.", &["method"])?;
//! requests.inc(&["GET"])?;
//!
//! let text = registry.to_text()?;
//! assert!(text.contains("app_requests_total{method=\"GET\"} 1"));
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]

mod common;
pub use self::common::{MetricError, MetricFamilySamples, MetricKind, Sample, StoreError};

pub mod key;

mod formatting;
pub use self::formatting::render;

mod handles;
pub use self::handles::{Counter, Gauge, Histogram};

pub mod storage;
pub use self::storage::{MemoryStore, StorageEngine, Store};

mod registry;
pub use self::registry::Registry;
