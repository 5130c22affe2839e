//! Persistence sinks
//!
//! The pipeline hands every flushed batch to exactly one `batch_insert`
//! call. Sinks are blocking; the flush worker runs them on the blocking pool.

pub mod memory;
pub mod sqlite;

pub use memory::MemorySink;
pub use sqlite::SqliteSink;

use crate::core::Tick;
use std::sync::Arc;

/// Sink failure. The batch that triggered it is gone.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Durable batch writer
///
/// # Design Notes
/// - Called by one consumer at a time, never reentrantly
/// - Must accept batches up to the configured batch cap
/// - No retry happens above this trait: `Err` means the batch is lost
pub trait PersistenceSink: Send + Sync + 'static {
    /// Sink name (for logging)
    fn name(&self) -> &'static str;

    /// Persist the whole batch
    fn batch_insert(&self, ticks: &[Tick]) -> Result<(), SinkError>;
}

impl<T: PersistenceSink + ?Sized> PersistenceSink for Arc<T> {
    #[inline]
    fn name(&self) -> &'static str {
        (**self).name()
    }

    #[inline]
    fn batch_insert(&self, ticks: &[Tick]) -> Result<(), SinkError> {
        (**self).batch_insert(ticks)
    }
}

/// Type-erased sinks, chosen from configuration at startup
impl<T: PersistenceSink + ?Sized> PersistenceSink for Box<T> {
    #[inline]
    fn name(&self) -> &'static str {
        (**self).name()
    }

    #[inline]
    fn batch_insert(&self, ticks: &[Tick]) -> Result<(), SinkError> {
        (**self).batch_insert(ticks)
    }
}
