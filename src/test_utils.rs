//! Test utilities for building ticks and pipelines
//!
//! Symbols are plain strings here; a bad symbol panics the test.

use crate::core::{Symbol, Tick};
use crate::infrastructure::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::sink::{MemorySink, PersistenceSink, SinkError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn sym(symbol: &str) -> Symbol {
    symbol.parse().unwrap()
}

pub fn tick(symbol: &str, price: f64, timestamp: i64) -> Tick {
    Tick::new(sym(symbol), price, timestamp)
}

pub fn pipeline_config(batch_cap: usize, flush_interval_ms: u64) -> PipelineConfig {
    PipelineConfig {
        flush_interval_ms,
        batch_cap,
    }
}

/// Pipeline over a shared sink, 100ms cadence
pub fn pipeline_with<S: PersistenceSink>(sink: S, batch_cap: usize) -> Arc<Pipeline<S>> {
    Arc::new(Pipeline::new(sink, &pipeline_config(batch_cap, 100)))
}

/// Pipeline backed by a `MemorySink` the test can inspect
pub fn memory_pipeline(batch_cap: usize) -> (Arc<Pipeline<Arc<MemorySink>>>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (pipeline_with(Arc::clone(&sink), batch_cap), sink)
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}

/// Sink that blocks inside every call, for observing in-flight cycles
#[derive(Debug)]
pub struct SlowSink {
    pub inner: MemorySink,
    pub delay: Duration,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    /// (start, end) of every call
    pub spans: Mutex<Vec<(Instant, Instant)>>,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemorySink::new(),
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            spans: Mutex::new(Vec::new()),
        }
    }
}

impl PersistenceSink for SlowSink {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn batch_insert(&self, ticks: &[Tick]) -> Result<(), SinkError> {
        let started = Instant::now();
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let result = self.inner.batch_insert(ticks);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().push((started, Instant::now()));
        result
    }
}

/// Sink that panics on every call
#[derive(Debug, Default)]
pub struct PanickingSink;

impl PersistenceSink for PanickingSink {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn batch_insert(&self, _ticks: &[Tick]) -> Result<(), SinkError> {
        panic!("sink exploded")
    }
}
