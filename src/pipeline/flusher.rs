//! Periodic flush worker
//!
//! One tokio task per pipeline. The worker sleeps for the flush interval,
//! runs a single flush cycle on the blocking pool, awaits it, then sleeps
//! again. The delay is measured from the end of one cycle to the start of
//! the next, so a slow sink stretches the cadence and cycles never overlap.

use super::{FlushOutcome, Pipeline};
use crate::sink::PersistenceSink;
use crate::{log_flush, IngestError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::Level;

/// Counters reported by a stopped worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushWorkerStats {
    /// Wake-ups after each delay
    pub cycles: u64,
    /// Wake-ups where the buffer was empty
    pub idle_cycles: u64,
    pub batches: u64,
    pub ticks: u64,
    pub failed_batches: u64,
}

/// Handle to the running flush task
pub struct FlushWorker<S: PersistenceSink> {
    pipeline: Arc<Pipeline<S>>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<FlushWorkerStats>,
}

/// Releases the pipeline's consumer slot when the task ends, panics included
struct Attachment<'a, S: PersistenceSink>(&'a Pipeline<S>);

impl<S: PersistenceSink> Drop for Attachment<'_, S> {
    fn drop(&mut self) {
        self.0.detach_flusher();
    }
}

impl<S: PersistenceSink> FlushWorker<S> {
    /// Start flushing `pipeline` every `flush_interval`
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `FlusherAttached` if another worker owns the pipeline,
    /// `AlreadyDrained` if it has been drained.
    pub fn spawn(pipeline: Arc<Pipeline<S>>) -> Result<Self> {
        pipeline.attach_flusher()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_flush_loop(Arc::clone(&pipeline), shutdown_rx));

        Ok(Self {
            pipeline,
            shutdown,
            handle,
        })
    }

    /// Signal the worker and wait for it to exit
    ///
    /// A cycle already running completes first. Ticks still buffered stay
    /// in the pipeline for `drain`.
    pub async fn stop(self) -> Result<FlushWorkerStats> {
        // Err only means the loop already exited
        let _ = self.shutdown.send(true);

        let stats = self
            .handle
            .await
            .map_err(|e| IngestError::Task(format!("flush worker: {}", e)))?;

        log_flush!(
            Level::INFO,
            batches = stats.batches,
            ticks = stats.ticks,
            failed = stats.failed_batches,
            buffered = self.pipeline.buffered(),
            "flush worker stopped"
        );
        Ok(stats)
    }
}

async fn run_flush_loop<S: PersistenceSink>(
    pipeline: Arc<Pipeline<S>>,
    mut shutdown: watch::Receiver<bool>,
) -> FlushWorkerStats {
    let _attachment = Attachment(&pipeline);
    let mut stats = FlushWorkerStats::default();

    let delay = pipeline.flush_interval();

    log_flush!(
        Level::INFO,
        delay_ms = delay.as_millis() as u64,
        batch_cap = pipeline.batch_cap(),
        sink = pipeline.sink().name(),
        "flush worker started"
    );

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = sleep(delay) => {}
        }

        stats.cycles += 1;
        if pipeline.buffered() == 0 {
            stats.idle_cycles += 1;
            continue;
        }

        let cycle = Arc::clone(&pipeline);
        match tokio::task::spawn_blocking(move || cycle.flush_cycle()).await {
            Ok(Ok(FlushOutcome::Flushed { batch, remaining })) => {
                stats.batches += 1;
                stats.ticks += batch as u64;
                if remaining > 0 {
                    log_flush!(Level::TRACE, remaining, "backlog carried to next cycle");
                }
            }
            Ok(Ok(FlushOutcome::Idle)) => stats.idle_cycles += 1,
            Ok(Err(e)) => {
                stats.failed_batches += 1;
                log_flush!(Level::ERROR, error = %e, "flush cycle failed, batch dropped");
            }
            Err(e) => {
                // Sink panics are caught inside the cycle; this is the
                // blocking task itself failing
                stats.failed_batches += 1;
                log_flush!(Level::ERROR, error = %e, "flush cycle aborted");
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tick;
    use crate::pipeline::Lifecycle;
    use crate::sink::MemorySink;
    use crate::test_utils::{memory_pipeline, pipeline_config, tick, wait_until, SlowSink};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_pipeline<S: PersistenceSink>(sink: S, batch_cap: usize) -> Arc<Pipeline<S>> {
        Arc::new(Pipeline::new(sink, &pipeline_config(batch_cap, 5)))
    }

    #[tokio::test]
    async fn test_worker_flushes_backlog_in_capped_batches() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = fast_pipeline(Arc::clone(&sink), 2000);
        let ticks: Vec<Tick> = (0..5000).map(|i| tick("AAPL", 150.0, i)).collect();
        pipeline.ingest(&ticks).unwrap();

        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();
        assert!(wait_until(WAIT, || sink.len() == 5000).await);
        let stats = worker.stop().await.unwrap();

        assert_eq!(sink.batch_sizes(), vec![2000, 2000, 1000]);
        assert_eq!(sink.ticks(), ticks);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.ticks, 5000);
        assert_eq!(pipeline.buffered(), 0);
    }

    #[tokio::test]
    async fn test_idle_worker_never_calls_sink() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = fast_pipeline(Arc::clone(&sink), 2000);

        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let stats = worker.stop().await.unwrap();

        assert_eq!(sink.calls(), 0);
        assert!(stats.idle_cycles > 0);
        assert_eq!(stats.batches, 0);
    }

    #[tokio::test]
    async fn test_worker_keeps_running_after_sink_failure() {
        let sink = Arc::new(MemorySink::failing_on([1]));
        let pipeline = fast_pipeline(Arc::clone(&sink), 10);
        pipeline
            .ingest(&(0..10).map(|i| tick("MSFT", 299.0, i)).collect::<Vec<_>>())
            .unwrap();

        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();
        assert!(wait_until(WAIT, || sink.calls() == 1).await);

        pipeline.ingest(&[tick("MSFT", 300.0, 10)]).unwrap();
        assert!(wait_until(WAIT, || sink.len() == 1).await);
        let stats = worker.stop().await.unwrap();

        assert_eq!(sink.ticks(), vec![tick("MSFT", 300.0, 10)]);
        assert_eq!(stats.failed_batches, 1);
        assert_eq!(pipeline.metrics().ticks_lost, 10);
    }

    #[tokio::test]
    async fn test_single_worker_per_pipeline() {
        let (pipeline, sink) = memory_pipeline(2000);
        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();

        assert!(matches!(
            FlushWorker::spawn(Arc::clone(&pipeline)),
            Err(IngestError::FlusherAttached)
        ));
        assert!(matches!(pipeline.drain(), Err(IngestError::FlusherAttached)));
        // A refused drain still closes admission
        assert_eq!(pipeline.lifecycle(), Lifecycle::Closed);

        worker.stop().await.unwrap();

        // Slot is free again once the worker has exited
        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();
        worker.stop().await.unwrap();
        pipeline.drain().unwrap();
        assert_eq!(sink.calls(), 0);

        assert!(matches!(
            FlushWorker::spawn(Arc::clone(&pipeline)),
            Err(IngestError::AlreadyDrained)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cycles_never_overlap_and_stop_waits() {
        let sink = Arc::new(SlowSink::new(Duration::from_millis(30)));
        let pipeline = fast_pipeline(Arc::clone(&sink), 5);
        pipeline
            .ingest(&(0..50).map(|i| tick("TSLA", 750.0, i)).collect::<Vec<_>>())
            .unwrap();

        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();
        assert!(wait_until(WAIT, || sink.active.load(Ordering::SeqCst) == 1).await);
        worker.stop().await.unwrap();

        // The cycle that was running when stop was called has finished
        assert_eq!(sink.active.load(Ordering::SeqCst), 0);
        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);
        assert!(sink.inner.len() >= 5);

        let flushed = sink.inner.len();
        let report = pipeline.drain().unwrap();
        assert_eq!(report.persisted, 50 - flushed);
        assert_eq!(sink.inner.len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_delay_after_each_cycle() {
        // Sink slower than the delay: the next cycle still waits a full delay
        let sink = Arc::new(SlowSink::new(Duration::from_millis(80)));
        let pipeline = Arc::new(Pipeline::new(Arc::clone(&sink), &pipeline_config(1, 50)));
        pipeline
            .ingest(&(0..4).map(|i| tick("AAPL", 150.0, i)).collect::<Vec<_>>())
            .unwrap();

        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();
        assert!(wait_until(WAIT, || sink.inner.len() == 4).await);
        worker.stop().await.unwrap();

        let spans = sink.spans.lock().clone();
        assert_eq!(spans.len(), 4);
        let gaps: Vec<Duration> = spans
            .windows(2)
            .map(|pair| pair[1].0.duration_since(pair[0].1))
            .collect();
        assert!(
            gaps.iter().all(|gap| *gap >= Duration::from_millis(45)),
            "cycles ran closer than the delay: {:?}",
            gaps
        );
    }

    #[tokio::test]
    async fn test_dropped_worker_releases_pipeline() {
        let (pipeline, _) = memory_pipeline(2000);
        let worker = FlushWorker::spawn(Arc::clone(&pipeline)).unwrap();
        drop(worker);

        // Dropping the handle closes the watch channel and the loop exits
        let pipeline_ref = Arc::clone(&pipeline);
        assert!(wait_until(WAIT, move || pipeline_ref.drain().is_ok()).await);
    }
}
