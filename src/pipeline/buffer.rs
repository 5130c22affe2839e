//! Ingestion buffer
//!
//! Unbounded lock-free FIFO between producers and the flush consumer.
//! Uses crossbeam-queue `SegQueue`: producers never block and never fail.
//!
//! There is deliberately no capacity limit. If the sink falls behind the
//! buffer grows; producers get no backpressure signal.

use crate::core::Tick;
use crossbeam_queue::SegQueue;

/// Staging queue for admitted ticks awaiting persistence
#[derive(Debug, Default)]
pub struct IngestionBuffer {
    queue: SegQueue<Tick>,
}

impl IngestionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail
    ///
    /// # Performance
    /// Lock-free, amortized O(1). Safe from any number of threads.
    #[inline(always)]
    pub fn enqueue(&self, tick: Tick) {
        self.queue.push(tick);
    }

    /// Remove at most `n` ticks from the head, oldest first
    ///
    /// Safe alongside concurrent `enqueue`; ticks pushed after the call
    /// observes an empty head are left for the next caller. Intended for a
    /// single consumer at a time.
    pub fn dequeue_up_to(&self, n: usize) -> Vec<Tick> {
        let mut batch = Vec::with_capacity(n.min(self.queue.len()));
        while batch.len() < n {
            match self.queue.pop() {
                Some(tick) => batch.push(tick),
                None => break,
            }
        }
        batch
    }

    /// Buffered count (a snapshot under concurrent mutation)
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
