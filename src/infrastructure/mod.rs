//! Infrastructure - off the ingest path
//!
//! - Configuration loading
//! - Logging setup and target macros
//! - Pipeline metrics
//! - Shutdown signals

pub mod config;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use config::{Config, ConfigError};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use shutdown::{ShutdownCause, ShutdownSignal};
