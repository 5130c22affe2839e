//! Tick ingestion service
//!
//! # Flow
//! 1. Open the configured sink and build the pipeline
//! 2. Start the periodic flush worker
//! 3. Run the load generator (or idle) until it finishes, ctrl-c or SIGTERM
//! 4. Close admission, stop the worker, drain the buffer
//! 5. Log final metrics and the price snapshot

use anyhow::Context;
use std::sync::Arc;
use tick_ingest::infrastructure::config::{Config, SinkBackend};
use tick_ingest::infrastructure::logging::init_logging;
use tick_ingest::infrastructure::{MetricsSnapshot, ShutdownSignal};
use tick_ingest::load::LoadGenerator;
use tick_ingest::{
    log_main, DrainReport, FlushWorker, IngestError, MemorySink, PersistenceSink, Pipeline, Result,
    SqliteSink,
};
use tracing::Level;

/// Main application state
pub struct TickIngestApp {
    config: Config,
}

impl TickIngestApp {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn open_sink(&self) -> Result<Box<dyn PersistenceSink>> {
        let sink: Box<dyn PersistenceSink> = match self.config.sink.backend {
            SinkBackend::Sqlite => Box::new(SqliteSink::open(&self.config.sink.database_path)?),
            SinkBackend::Memory => Box::new(MemorySink::new()),
        };
        log_main!(Level::INFO, sink = sink.name(), "sink ready");
        Ok(sink)
    }

    /// Run until the load finishes or a shutdown signal arrives, then drain
    ///
    /// Returns the final metrics. Failures joining the load or the flush
    /// worker are logged; the drain runs regardless.
    pub async fn run(&self) -> Result<MetricsSnapshot> {
        let mut signal = ShutdownSignal::install()?;
        let pipeline = Arc::new(Pipeline::new(self.open_sink()?, &self.config.pipeline));
        let worker = FlushWorker::spawn(Arc::clone(&pipeline))?;

        if self.config.load.enabled {
            let generator = LoadGenerator::from_config(&self.config.load)?;
            let handle = generator.spawn(Arc::clone(&pipeline));

            let stopper = handle.stopper();
            let watcher = tokio::spawn(async move {
                match signal.recv().await {
                    Ok(cause) => log_main!(Level::INFO, %cause, "shutdown signal, stopping load"),
                    Err(e) => log_main!(Level::WARN, error = %e, "signal wait failed, stopping load"),
                }
                stopper.stop();
            });

            match handle.join().await {
                Ok(report) => log_main!(
                    Level::INFO,
                    producers = report.producers,
                    batches = report.batches,
                    accepted = report.accepted,
                    "load run complete"
                ),
                Err(e) => log_main!(Level::ERROR, error = %e, "load run failed, draining anyway"),
            }
            watcher.abort();
        } else {
            log_main!(Level::INFO, "load generator disabled, waiting for ctrl-c or SIGTERM");
            match signal.recv().await {
                Ok(cause) => log_main!(Level::INFO, %cause, "shutdown signal received"),
                Err(e) => log_main!(Level::ERROR, error = %e, "signal wait failed, shutting down"),
            }
        }

        let drained = shutdown(&pipeline, worker).await;

        let metrics = pipeline.metrics();
        log_main!(
            Level::INFO,
            accepted = metrics.ticks_accepted,
            discarded = metrics.ticks_discarded,
            rejected = metrics.ticks_rejected,
            persisted = metrics.ticks_persisted,
            lost = metrics.ticks_lost,
            in_flight = metrics.in_flight(),
            batches = metrics.batches_flushed,
            rate = metrics.ingest_rate,
            "final metrics"
        );

        match pipeline.snapshot().to_json() {
            Ok(prices) => log_main!(Level::INFO, %prices, "final prices"),
            Err(e) => log_main!(Level::WARN, error = %e, "could not serialize price snapshot"),
        }

        drained.map(|_| metrics)
    }
}

/// Close admission, stop the worker, drain on the blocking pool
async fn shutdown<S: PersistenceSink>(
    pipeline: &Arc<Pipeline<S>>,
    worker: FlushWorker<S>,
) -> Result<DrainReport> {
    pipeline.close();
    match worker.stop().await {
        Ok(stats) => log_main!(
            Level::INFO,
            cycles = stats.cycles,
            batches = stats.batches,
            ticks = stats.ticks,
            "flush worker joined"
        ),
        Err(e) => log_main!(Level::ERROR, error = %e, "flush worker failed, draining anyway"),
    }

    let draining = Arc::clone(pipeline);
    tokio::task::spawn_blocking(move || draining.drain())
        .await
        .map_err(|e| IngestError::Task(format!("drain: {}", e)))?
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    // Guards flush buffered log lines on drop
    let _log_guards = init_logging(&config.logging).context("failed to initialize logging")?;

    let app = TickIngestApp::new(config);
    app.run().await?;

    Ok(())
}
