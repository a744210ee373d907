use std::sync::Arc;
use std::thread;

use polymetrics::storage::Store;
use polymetrics::{MemoryStore, MetricError, MetricKind, Registry, StoreError};

fn registry_with_store() -> (Registry, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Registry::new(store.clone()), store)
}

#[test]
fn gauge_set_is_last_write_wins() {
    let (mut registry, _) = registry_with_store();
    let gauge = registry
        .register_gauge("test", "some_metric", "this is for testing", &["foo", "bar"])
        .unwrap();

    gauge.set(123.0, &["lalal", "lululu"]).unwrap();

    let families = registry.collect().unwrap();
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].name, "test_some_metric");
    assert_eq!(families[0].help, "this is for testing");
    assert_eq!(families[0].kind, MetricKind::Gauge);
    assert_eq!(families[0].label_names, vec!["foo".to_string(), "bar".to_string()]);
    assert_eq!(families[0].samples.len(), 1);
    assert_eq!(
        families[0].samples[0].label_values,
        vec!["lalal".to_string(), "lululu".to_string()]
    );
    assert_eq!(families[0].samples[0].value, 123.0);

    gauge.set(5.0, &["lalal", "lululu"]).unwrap();
    let families = registry.collect().unwrap();
    assert_eq!(families[0].samples[0].value, 5.0);
}

#[test]
fn gauge_increments_and_decrements() {
    let (mut registry, _) = registry_with_store();
    let gauge = registry.register_gauge("test", "some_metric", "help", &["foo"]).unwrap();

    gauge.inc(&["a"]).unwrap();
    gauge.inc_by(123.0, &["a"]).unwrap();
    assert_eq!(registry.collect().unwrap()[0].samples[0].value, 124.0);

    gauge.dec(&["a"]).unwrap();
    gauge.dec_by(247.0, &["a"]).unwrap();
    assert_eq!(registry.collect().unwrap()[0].samples[0].value, -124.0);
}

#[test]
fn counter_accumulates_and_rejects_negative_deltas() {
    let (mut registry, _) = registry_with_store();
    let counter = registry.register_counter("test", "requests", "help", &[]).unwrap();

    counter.inc(&[]).unwrap();
    counter.inc_by(123.0, &[]).unwrap();
    assert_eq!(registry.collect().unwrap()[0].samples[0].value, 124.0);

    let result = counter.inc_by(-1.0, &[]);
    assert!(matches!(result, Err(MetricError::NegativeIncrement(_))));
    assert_eq!(registry.collect().unwrap()[0].samples[0].value, 124.0);
}

#[test]
fn histogram_observation_lands_in_cumulative_buckets() {
    let (mut registry, _) = registry_with_store();
    let histogram = registry
        .register_histogram("test", "duration", "help", &[], &[100.0, 200.0, 300.0])
        .unwrap();

    histogram.observe(150.0, &[]).unwrap();

    let families = registry.collect().unwrap();
    assert_eq!(families.len(), 1);
    let samples = &families[0].samples;

    let expectations = [
        ("test_duration_bucket", Some("100"), 0.0),
        ("test_duration_bucket", Some("200"), 1.0),
        ("test_duration_bucket", Some("300"), 1.0),
        ("test_duration_bucket", Some("+Inf"), 1.0),
        ("test_duration_sum", None, 150.0),
        ("test_duration_count", None, 1.0),
    ];
    assert_eq!(samples.len(), expectations.len());
    for (sample, (name, le, value)) in samples.iter().zip(expectations) {
        assert_eq!(sample.name, name);
        assert_eq!(sample.label_values.last().map(String::as_str), le);
        assert_eq!(sample.value, value);
    }
}

#[test]
fn mutations_from_independent_processes_aggregate() {
    let store = Arc::new(MemoryStore::new());

    // Two "processes", each with its own registry over the shared store.
    let mut process_a = Registry::new(store.clone());
    let mut process_b = Registry::new(store.clone());
    let counter_a =
        process_a.register_counter("app", "jobs_total", "Jobs processed.", &["queue"]).unwrap();
    let counter_b =
        process_b.register_counter("app", "jobs_total", "Jobs processed.", &["queue"]).unwrap();

    counter_a.inc(&["mail"]).unwrap();
    counter_b.inc_by(2.0, &["mail"]).unwrap();

    // The collector never registered anything; everything comes off the store.
    let collector = Registry::new(store);
    let families = collector.collect().unwrap();
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].samples[0].value, 3.0);
}

#[test]
fn concurrent_increments_are_never_lost() {
    const THREADS: usize = 8;
    const INCREMENTS: usize = 250;

    let store = Arc::new(MemoryStore::new());
    thread::scope(|scope| {
        for _ in 0..THREADS {
            let store = store.clone();
            scope.spawn(move || {
                let mut registry = Registry::new(store);
                let counter =
                    registry.register_counter("app", "hits_total", "Hits.", &[]).unwrap();
                for _ in 0..INCREMENTS {
                    counter.inc(&[]).unwrap();
                }
            });
        }
    });

    let registry = Registry::new(store);
    let families = registry.collect().unwrap();
    assert_eq!(families[0].samples[0].value, (THREADS * INCREMENTS) as f64);
}

#[test]
fn families_without_observations_emit_nothing() {
    let (mut registry, store) = registry_with_store();
    registry.register_gauge("app", "idle", "Never touched.", &[]).unwrap();
    registry.register_histogram("app", "silent", "Never observed.", &[], &[1.0]).unwrap();

    assert_eq!(registry.to_text().unwrap(), "");
    assert!(registry.collect().unwrap().is_empty());

    // Only the metadata records exist; no sample was synthesized.
    assert_eq!(store.len(), 2);
}

#[test]
fn label_arity_is_checked_at_mutation_time() {
    let (mut registry, _) = registry_with_store();
    let gauge = registry.register_gauge("app", "speed", "help", &["vehicle"]).unwrap();

    let result = gauge.set(1.0, &[]);
    assert!(matches!(result, Err(MetricError::LabelMismatch { expected: 1, actual: 0 })));
    let result = gauge.set(1.0, &["car", "extra"]);
    assert!(matches!(result, Err(MetricError::LabelMismatch { expected: 1, actual: 2 })));
}

#[test]
fn exposition_output_is_exact() {
    let (mut registry, _) = registry_with_store();
    let gauge =
        registry.register_gauge("app", "temperature", "Outside temperature.", &["city"]).unwrap();
    let counter =
        registry.register_counter("app", "requests_total", "Requests served.", &[]).unwrap();

    gauge.set(21.5, &["berlin"]).unwrap();
    gauge.set(19.0, &["aachen"]).unwrap();
    counter.inc_by(3.0, &[]).unwrap();

    assert_eq!(
        registry.to_text().unwrap(),
        "# HELP app_temperature Outside temperature.\n\
         # TYPE app_temperature gauge\n\
         app_temperature{city=\"aachen\"} 19\n\
         app_temperature{city=\"berlin\"} 21.5\n\
         # HELP app_requests_total Requests served.\n\
         # TYPE app_requests_total counter\n\
         app_requests_total 3\n"
    );
}

#[test]
fn label_values_are_escaped_in_output() {
    let (mut registry, _) = registry_with_store();
    let gauge = registry.register_gauge("app", "oddity", "help", &["path"]).unwrap();
    gauge.set(1.0, &["back\\slash \"quote\"\nnewline"]).unwrap();

    let text = registry.to_text().unwrap();
    assert!(text.contains("app_oddity{path=\"back\\\\slash \\\"quote\\\"\\nnewline\"} 1\n"));
}

#[test]
fn histogram_renders_bucket_lines() {
    let (mut registry, _) = registry_with_store();
    let histogram =
        registry.register_histogram("app", "latency", "Latency.", &["route"], &[0.5]).unwrap();
    histogram.observe(0.25, &["home"]).unwrap();

    let text = registry.to_text().unwrap();
    assert!(text.contains("# TYPE app_latency histogram\n"));
    assert!(text.contains("app_latency_bucket{route=\"home\",le=\"0.5\"} 1\n"));
    assert!(text.contains("app_latency_bucket{route=\"home\",le=\"+Inf\"} 1\n"));
    assert!(text.contains("app_latency_sum{route=\"home\"} 0.25\n"));
    assert!(text.contains("app_latency_count{route=\"home\"} 1\n"));
}

struct UnreachableStore;

impl Store for UnreachableStore {
    fn set(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn incr_by(&self, _: &str, _: f64) -> Result<f64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn scan_prefix(&self, _: &str) -> Result<Vec<(String, String)>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[test]
fn store_failures_propagate_to_the_caller() {
    let mut registry = Registry::new(Arc::new(UnreachableStore));

    // Registration already writes the metadata record, so it fails loudly.
    let result = registry.register_counter("app", "requests", "help", &[]);
    assert!(matches!(result, Err(MetricError::Store(StoreError::Unavailable(_)))));

    let result = registry.collect();
    assert!(matches!(result, Err(MetricError::Store(StoreError::Unavailable(_)))));
}
