//! Pipeline metrics
//!
//! Lock-free counters using atomic operations.
//! Bumped by producers and the flush consumer, read as snapshots for logs.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::core::now_millis;

/// Pipeline metrics collector
///
/// Producer-side and consumer-side counters sit on separate cache lines
/// so ingest traffic does not false-share with the flush worker.
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Ticks admitted into the buffer
    ticks_accepted: CachePadded<AtomicU64>,
    /// Ticks dropped for a non-positive price
    ticks_discarded: CachePadded<AtomicU64>,
    /// Ticks refused because the pipeline was closed
    ticks_rejected: CachePadded<AtomicU64>,
    /// Ticks the sink confirmed
    ticks_persisted: AtomicU64,
    /// Ticks in batches the sink refused
    ticks_lost: AtomicU64,
    batches_flushed: AtomicU64,
    batches_failed: AtomicU64,
    /// Last successful flush (epoch millis, 0 = never)
    last_flush_ms: AtomicU64,
    start_time: Instant,
}

/// Metrics snapshot for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub ticks_accepted: u64,
    pub ticks_discarded: u64,
    pub ticks_rejected: u64,
    pub ticks_persisted: u64,
    pub ticks_lost: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub last_flush_ms: u64,
    pub ingest_rate: f64, // accepted ticks per second
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Accepted ticks not yet persisted or lost
    pub fn in_flight(&self) -> u64 {
        self.ticks_accepted
            .saturating_sub(self.ticks_persisted)
            .saturating_sub(self.ticks_lost)
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            ticks_accepted: CachePadded::new(AtomicU64::new(0)),
            ticks_discarded: CachePadded::new(AtomicU64::new(0)),
            ticks_rejected: CachePadded::new(AtomicU64::new(0)),
            ticks_persisted: AtomicU64::new(0),
            ticks_lost: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            last_flush_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one ingest call
    #[inline]
    pub fn record_ingest(&self, accepted: usize, discarded: usize) {
        if accepted > 0 {
            self.ticks_accepted.fetch_add(accepted as u64, Ordering::Relaxed);
        }
        if discarded > 0 {
            self.ticks_discarded.fetch_add(discarded as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_rejected(&self, count: usize) {
        self.ticks_rejected.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a batch the sink accepted
    pub fn record_flush(&self, count: usize) {
        self.ticks_persisted.fetch_add(count as u64, Ordering::Relaxed);
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.last_flush_ms
            .store(now_millis().max(0) as u64, Ordering::Relaxed);
    }

    /// Record a batch the sink refused
    pub fn record_loss(&self, count: usize) {
        self.ticks_lost.fetch_add(count as u64, Ordering::Relaxed);
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let accepted = self.ticks_accepted.load(Ordering::Relaxed);

        let uptime = self.start_time.elapsed();
        let rate = if uptime.as_secs_f64() > 0.0 {
            accepted as f64 / uptime.as_secs_f64()
        } else {
            0.0
        };

        MetricsSnapshot {
            ticks_accepted: accepted,
            ticks_discarded: self.ticks_discarded.load(Ordering::Relaxed),
            ticks_rejected: self.ticks_rejected.load(Ordering::Relaxed),
            ticks_persisted: self.ticks_persisted.load(Ordering::Relaxed),
            ticks_lost: self.ticks_lost.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            last_flush_ms: self.last_flush_ms.load(Ordering::Relaxed),
            ingest_rate: rate,
            uptime_seconds: uptime.as_secs(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
