//! In-memory recording sink
//!
//! Keeps every accepted batch in call order. Used for dry runs
//! (`backend = "memory"`) and throughout the pipeline tests.

use super::{PersistenceSink, SinkError};
use crate::core::Tick;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<Tick>>>,
    /// Every `batch_insert` call, failed ones included
    calls: AtomicUsize,
    /// 1-based call numbers that must fail
    fail_on: HashSet<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects the given (1-based) calls with `SinkError::Unavailable`
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_on: calls.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Accepted batches, in call order
    pub fn batches(&self) -> Vec<Vec<Tick>> {
        self.batches.lock().clone()
    }

    /// Sizes of the accepted batches
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    /// Accepted ticks, flattened in persistence order
    pub fn ticks(&self) -> Vec<Tick> {
        self.batches.lock().iter().flatten().copied().collect()
    }

    /// Total accepted ticks
    pub fn len(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `batch_insert` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

impl PersistenceSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn batch_insert(&self, ticks: &[Tick]) -> Result<(), SinkError> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        if self.fail_on.contains(&call) {
            return Err(SinkError::Unavailable(format!(
                "injected failure on call {}",
                call
            )));
        }

        self.batches.lock().push(ticks.to_vec());
        Ok(())
    }
}
