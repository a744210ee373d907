use getopts::Options;
use hdrhistogram::Histogram as HdrHistogram;
use log::{error, info};
use polymetrics::{MemoryStore, Registry};
use std::{
    env,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

const LOOP_SAMPLE: u64 = 1000;

struct Producer {
    store: Arc<MemoryStore>,
    label: String,
    done: Arc<AtomicBool>,
    rate_counter: Arc<AtomicU64>,
    hist: HdrHistogram<u64>,
}

impl Producer {
    fn new(
        store: Arc<MemoryStore>,
        index: usize,
        done: Arc<AtomicBool>,
        rate_counter: Arc<AtomicU64>,
    ) -> Producer {
        Producer {
            store,
            label: format!("p{}", index),
            done,
            rate_counter,
            hist: HdrHistogram::<u64>::new_with_bounds(1, u64::MAX, 3).unwrap(),
        }
    }

    // Each producer owns its own registry over the shared store, the same
    // shape as one short-lived process per web request.
    fn run(&mut self) {
        let mut registry = Registry::new(self.store.clone());
        let counter = registry
            .register_counter("bench", "ok_total", "Operations that succeeded.", &["producer"])
            .expect("failed to register counter");
        let gauge = registry
            .register_gauge("bench", "inflight", "In-flight operations.", &["producer"])
            .expect("failed to register gauge");
        let histogram = registry
            .register_histogram(
                "bench",
                "op_duration_seconds",
                "Store round-trip duration.",
                &["producer"],
                &[],
            )
            .expect("failed to register histogram");

        let label = self.label.clone();
        let labels = [label.as_str()];
        let mut loop_counter = 0u64;
        let mut level = 0.0;

        loop {
            loop_counter += 1;
            level += 1.0;

            let start = if loop_counter % LOOP_SAMPLE == 0 { Some(Instant::now()) } else { None };

            counter.inc(&labels).expect("counter increment failed");
            gauge.set(level, &labels).expect("gauge set failed");
            histogram.observe(0.001, &labels).expect("histogram observe failed");

            if let Some(t0) = start {
                let delta = t0.elapsed();
                self.hist.saturating_record(delta.as_nanos() as u64);

                // We also increment our global counter for the sample rate here.
                self.rate_counter.fetch_add(LOOP_SAMPLE * 3, Ordering::AcqRel);

                if self.done.load(Ordering::Relaxed) {
                    break;
                }
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        info!(
            "    mutation latency: min: {:8} p50: {:8} p95: {:8} p99: {:8} p999: {:8} max: {:8}",
            nanos_to_readable(self.hist.min()),
            nanos_to_readable(self.hist.value_at_percentile(50.0)),
            nanos_to_readable(self.hist.value_at_percentile(95.0)),
            nanos_to_readable(self.hist.value_at_percentile(99.0)),
            nanos_to_readable(self.hist.value_at_percentile(99.9)),
            nanos_to_readable(self.hist.max())
        );
    }
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

pub fn opts() -> Options {
    let mut opts = Options::new();

    opts.optopt("d", "duration", "number of seconds to run the benchmark", "INTEGER");
    opts.optopt("p", "producers", "number of producers", "INTEGER");
    opts.optflag("h", "help", "print this help menu");

    opts
}

fn main() {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = &args[0];
    let opts = opts();

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            error!("Failed to parse command line args: {}", f);
            return;
        }
    };

    if matches.opt_present("help") {
        print_usage(program, &opts);
        return;
    }

    info!("polymetrics benchmark");

    let seconds: u64 =
        matches.opt_str("duration").unwrap_or_else(|| "60".to_owned()).parse().unwrap();
    let producers: usize =
        matches.opt_str("producers").unwrap_or_else(|| "1".to_owned()).parse().unwrap();

    info!("duration: {}s", seconds);
    info!("producers: {}", producers);

    let store = Arc::new(MemoryStore::new());
    let done = Arc::new(AtomicBool::new(false));
    let rate_counter = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    for index in 0..producers {
        let s = store.clone();
        let d = done.clone();
        let r = rate_counter.clone();
        let handle = thread::spawn(move || {
            let mut producer = Producer::new(s, index, d, r);
            producer.run();
        });

        handles.push(handle);
    }

    // Poll the rate counter to figure out the sample rate.
    let mut total = 0;
    let mut t0 = Instant::now();

    for _ in 0..seconds {
        let t1 = Instant::now();

        let turn_total = rate_counter.load(Ordering::Acquire);
        let turn_delta = turn_total - total;
        total = turn_total;
        let rate = turn_delta as f64 / ((t1 - t0).as_secs_f64());

        info!("sample ingest rate: {:.0} samples/sec", rate);
        t0 = t1;
        thread::sleep(Duration::new(1, 0));
    }

    info!("--------------------------------------------------------------------------------");
    info!(" ingested samples total: {}", total);

    done.store(true, Ordering::SeqCst);
    for handle in handles {
        let _ = handle.join();
    }

    // One collection pass over everything the producers wrote.
    let collector = Registry::new(store);
    let scrape_start = Instant::now();
    match collector.to_text() {
        Ok(text) => info!(
            " final scrape: {} bytes in {:?}",
            text.len(),
            scrape_start.elapsed()
        ),
        Err(e) => error!("final scrape failed: {}", e),
    }
}

fn nanos_to_readable(t: u64) -> String {
    let f = t as f64;
    if f < 1_000.0 {
        format!("{}ns", f)
    } else if f < 1_000_000.0 {
        format!("{:.0}μs", f / 1_000.0)
    } else if f < 2_000_000_000.0 {
        format!("{:.2}ms", f / 1_000_000.0)
    } else {
        format!("{:.3}s", f / 1_000_000_000.0)
    }
}
