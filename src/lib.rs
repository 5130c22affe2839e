//! Buffered price-tick ingestion
//!
//! Producers hand batches of ticks to an in-memory pipeline that
//! acknowledges immediately, keeps a last-value price cache, and persists
//! everything through a single periodic flush consumer. On shutdown the
//! buffer is drained completely before the process exits.

pub mod core;
pub mod infrastructure;
pub mod load;
pub mod pipeline;
pub mod sink;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types
pub use crate::core::{Symbol, Tick};
pub use infrastructure::config::{Config, PipelineConfig};
pub use pipeline::{DrainReport, FlushOutcome, FlushWorker, IngestReceipt, Pipeline, PriceSnapshot};
pub use sink::{MemorySink, PersistenceSink, SinkError, SqliteSink};

use thiserror::Error;

/// Main error type for the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("pipeline is closed to new ticks")]
    Closed,

    #[error("sink rejected a batch of {lost} ticks: {source}")]
    BatchLost {
        lost: usize,
        #[source]
        source: SinkError,
    },

    #[error("a flush worker is attached to this pipeline")]
    FlusherAttached,

    #[error("pipeline has already been drained")]
    AlreadyDrained,

    #[error("drain finished with {lost} ticks lost ({persisted} persisted)")]
    DrainLoss { persisted: usize, lost: usize },

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("configuration error: {0}")]
    Config(#[from] infrastructure::config::ConfigError),

    #[error("task failed: {0}")]
    Task(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;
