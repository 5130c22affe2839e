//! Buffered ingestion pipeline
//!
//! Producers call `ingest` from any thread. A single consumer (the
//! `FlushWorker`, or `drain` at shutdown) moves bounded batches from the
//! buffer into the sink.
//!
//! Lifecycle: `Running -> Closed -> Draining -> Drained`. Closing stops
//! admission; draining waits for in-flight `ingest` calls to finish and
//! then flushes until the buffer is empty.

pub mod buffer;
pub mod cache;
pub mod flusher;

pub use buffer::IngestionBuffer;
pub use cache::{PriceCache, PriceSnapshot};
pub use flusher::{FlushWorker, FlushWorkerStats};

use crate::core::Tick;
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::sink::{PersistenceSink, SinkError};
use crate::{log_flush, log_main, IngestError, Result};
use crossbeam_utils::Backoff;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::Level;

/// Acknowledgment for one `ingest` call: receipt, not durability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Ticks buffered and cached
    pub accepted: usize,
    /// Ticks silently dropped for a non-positive price
    pub discarded: usize,
}

/// Result of one flush cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Buffer was empty, sink not called
    Idle,
    /// One batch handed to the sink and confirmed
    Flushed { batch: usize, remaining: usize },
}

/// Summary of a completed drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Buffered ticks when draining started
    pub initial_len: usize,
    /// Batches the sink confirmed
    pub batches: usize,
    pub persisted: usize,
    pub failed_batches: usize,
    pub lost: usize,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    Running = 0,
    Closed = 1,
    Draining = 2,
    Drained = 3,
}

impl Lifecycle {
    #[inline]
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Closed,
            2 => Self::Draining,
            _ => Self::Drained,
        }
    }
}

/// The ingestion pipeline
///
/// Created once at startup and shared as `Arc<Pipeline<S>>` between
/// producers, the flush worker and the shutdown path.
pub struct Pipeline<S> {
    buffer: IngestionBuffer,
    cache: PriceCache,
    sink: S,
    batch_cap: usize,
    flush_interval: Duration,
    metrics: PipelineMetrics,
    state: AtomicU8,
    /// `ingest` calls currently past the admission check
    inflight: AtomicUsize,
    flusher_attached: AtomicBool,
}

/// Decrements the in-flight counter when an `ingest` call returns
struct Admission<'a>(&'a AtomicUsize);

impl Drop for Admission<'_> {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: PersistenceSink> Pipeline<S> {
    pub fn new(sink: S, config: &PipelineConfig) -> Self {
        Self {
            buffer: IngestionBuffer::new(),
            cache: PriceCache::new(),
            sink,
            // A zero cap would make every cycle idle and drain spin forever
            batch_cap: config.batch_cap.max(1),
            flush_interval: config.flush_interval().max(Duration::from_millis(1)),
            metrics: PipelineMetrics::new(),
            state: AtomicU8::new(Lifecycle::Running as u8),
            inflight: AtomicUsize::new(0),
            flusher_attached: AtomicBool::new(false),
        }
    }

    /// Admit a batch of ticks
    ///
    /// Ticks with `price > 0` are enqueued and written to the price cache;
    /// the rest are dropped without error. Never touches the sink.
    ///
    /// # Errors
    /// `IngestError::Closed` once `close` or `drain` has been called.
    pub fn ingest(&self, ticks: &[Tick]) -> Result<IngestReceipt> {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        let _admission = Admission(&self.inflight);

        if self.lifecycle() != Lifecycle::Running {
            self.metrics.record_rejected(ticks.len());
            return Err(IngestError::Closed);
        }

        let mut receipt = IngestReceipt::default();
        for tick in ticks {
            if tick.is_admissible() {
                self.buffer.enqueue(*tick);
                self.cache.set(tick.symbol(), tick.price());
                receipt.accepted += 1;
            } else {
                receipt.discarded += 1;
            }
        }

        self.metrics.record_ingest(receipt.accepted, receipt.discarded);
        Ok(receipt)
    }

    /// Current symbol -> price view
    pub fn snapshot(&self) -> PriceSnapshot {
        self.cache.snapshot()
    }

    /// Ticks waiting for persistence
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn batch_cap(&self) -> usize {
        self.batch_cap
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Stop admitting ticks. Returns false if already closed.
    pub fn close(&self) -> bool {
        let closed = self
            .state
            .compare_exchange(
                Lifecycle::Running as u8,
                Lifecycle::Closed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if closed {
            log_main!(Level::INFO, buffered = self.buffered(), "pipeline closed to new ticks");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle() != Lifecycle::Running
    }

    /// Run one flush cycle
    ///
    /// Moves at most `batch_cap` ticks from the head of the buffer into a
    /// single sink call. A sink error or panic loses that batch: it is
    /// counted and returned, never re-enqueued.
    pub fn flush_cycle(&self) -> Result<FlushOutcome> {
        if self.buffer.is_empty() {
            return Ok(FlushOutcome::Idle);
        }

        let batch = self.buffer.dequeue_up_to(self.batch_cap);
        if batch.is_empty() {
            return Ok(FlushOutcome::Idle);
        }

        let started = Instant::now();
        let inserted = panic::catch_unwind(AssertUnwindSafe(|| self.sink.batch_insert(&batch)))
            .unwrap_or_else(|_| Err(SinkError::Unavailable("sink panicked".into())));
        match inserted {
            Ok(()) => {
                self.metrics.record_flush(batch.len());
                let remaining = self.buffer.len();
                log_flush!(
                    Level::DEBUG,
                    batch = batch.len(),
                    remaining,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    sink = self.sink.name(),
                    "batch persisted"
                );
                Ok(FlushOutcome::Flushed {
                    batch: batch.len(),
                    remaining,
                })
            }
            Err(source) => {
                self.metrics.record_loss(batch.len());
                Err(IngestError::BatchLost {
                    lost: batch.len(),
                    source,
                })
            }
        }
    }

    /// Flush until the buffer is empty (shutdown path)
    ///
    /// Closes admission, waits for in-flight `ingest` calls, then runs
    /// flush cycles with no iteration or time bound. Failed batches are
    /// logged and skipped so the remaining ticks still reach the sink.
    ///
    /// # Errors
    /// - `FlusherAttached` if a `FlushWorker` is still running (the
    ///   pipeline is left closed)
    /// - `AlreadyDrained` on a second call
    /// - `DrainLoss` after the buffer is empty, if any batch was lost
    pub fn drain(&self) -> Result<DrainReport> {
        self.begin_drain()?;
        if self.flusher_attached.load(Ordering::SeqCst) {
            self.state.store(Lifecycle::Closed as u8, Ordering::SeqCst);
            return Err(IngestError::FlusherAttached);
        }
        self.wait_for_producers();

        let mut report = DrainReport {
            initial_len: self.buffer.len(),
            ..DrainReport::default()
        };
        log_main!(
            Level::INFO,
            buffered = report.initial_len,
            sink = self.sink.name(),
            "shutdown signal received, draining buffer"
        );

        let started = Instant::now();
        while !self.buffer.is_empty() {
            match self.flush_cycle() {
                Ok(FlushOutcome::Flushed { batch, .. }) => {
                    report.batches += 1;
                    report.persisted += batch;
                }
                Ok(FlushOutcome::Idle) => {}
                Err(IngestError::BatchLost { lost, source }) => {
                    report.failed_batches += 1;
                    report.lost += lost;
                    log_flush!(Level::ERROR, lost, error = %source, "batch lost during drain");
                }
                Err(other) => {
                    self.state.store(Lifecycle::Drained as u8, Ordering::SeqCst);
                    return Err(other);
                }
            }
        }
        self.state.store(Lifecycle::Drained as u8, Ordering::SeqCst);

        log_main!(
            Level::INFO,
            persisted = report.persisted,
            lost = report.lost,
            batches = report.batches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "shutdown complete, flushed {} ticks",
            report.persisted
        );

        if report.lost > 0 {
            return Err(IngestError::DrainLoss {
                persisted: report.persisted,
                lost: report.lost,
            });
        }
        Ok(report)
    }

    /// Running/Closed -> Draining, exactly once
    fn begin_drain(&self) -> Result<()> {
        loop {
            let current = self.state.load(Ordering::SeqCst);
            match Lifecycle::from_raw(current) {
                Lifecycle::Running | Lifecycle::Closed => {
                    if self
                        .state
                        .compare_exchange(
                            current,
                            Lifecycle::Draining as u8,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        )
                        .is_ok()
                    {
                        return Ok(());
                    }
                }
                Lifecycle::Draining | Lifecycle::Drained => {
                    return Err(IngestError::AlreadyDrained)
                }
            }
        }
    }

    /// Spin until every `ingest` call that passed admission has returned
    fn wait_for_producers(&self) {
        let backoff = Backoff::new();
        while self.inflight.load(Ordering::SeqCst) != 0 {
            backoff.snooze();
        }
    }

    /// Claim the single consumer slot for a periodic worker
    pub(crate) fn attach_flusher(&self) -> Result<()> {
        if self
            .flusher_attached
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IngestError::FlusherAttached);
        }
        if self.lifecycle() >= Lifecycle::Draining {
            self.flusher_attached.store(false, Ordering::SeqCst);
            return Err(IngestError::AlreadyDrained);
        }
        Ok(())
    }

    pub(crate) fn detach_flusher(&self) {
        self.flusher_attached.store(false, Ordering::SeqCst);
    }
}
