//! Synthetic load generator
//!
//! Stands in for external producers: N concurrent tasks each build one
//! tick per configured instrument (`base_price + uniform(0, jitter)`,
//! stamped now), ingest the batch, pause, and repeat until the deadline,
//! a stop request, or the pipeline closing.

use crate::core::{Symbol, Tick};
use crate::infrastructure::config::{ConfigError, LoadConfig};
use crate::pipeline::Pipeline;
use crate::sink::PersistenceSink;
use crate::{log_main, IngestError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Instrument {
    symbol: Symbol,
    base_price: f64,
    jitter: f64,
}

/// Totals across all producers of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub producers: usize,
    /// Batches the pipeline acknowledged
    pub batches: u64,
    pub accepted: u64,
    pub discarded: u64,
    /// Batches refused because the pipeline was closed
    pub rejected_batches: u64,
}

impl LoadReport {
    fn absorb(&mut self, other: LoadReport) {
        self.batches += other.batches;
        self.accepted += other.accepted;
        self.discarded += other.discarded;
        self.rejected_batches += other.rejected_batches;
    }
}

#[derive(Debug, Clone)]
pub struct LoadGenerator {
    instruments: Arc<[Instrument]>,
    producers: usize,
    duration: Duration,
    pause: Duration,
}

impl LoadGenerator {
    pub fn from_config(config: &LoadConfig) -> Result<Self> {
        let instruments = config
            .instruments
            .iter()
            .map(|instrument| -> Result<Instrument> {
                let symbol = instrument.symbol().map_err(|e| {
                    ConfigError::Invalid(format!("load instrument {:?}: {}", instrument.symbol, e))
                })?;
                Ok(Instrument {
                    symbol,
                    base_price: instrument.base_price,
                    jitter: instrument.jitter.max(0.0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            instruments: instruments.into(),
            producers: config.producers,
            duration: config.duration(),
            pause: config.pause(),
        })
    }

    /// One tick per instrument, all stamped with the same wall clock
    pub fn batch<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Tick> {
        make_batch(&self.instruments, rng)
    }

    /// Start all producers against `pipeline`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: PersistenceSink>(&self, pipeline: Arc<Pipeline<S>>) -> LoadHandle {
        let (stop, stop_rx) = watch::channel(false);
        let deadline = Instant::now() + self.duration;

        log_main!(
            Level::INFO,
            producers = self.producers,
            instruments = self.instruments.len(),
            duration_secs = self.duration.as_secs(),
            "load generator started"
        );

        let producers: Vec<JoinHandle<LoadReport>> = (0..self.producers)
            .map(|_| {
                tokio::spawn(run_producer(
                    Arc::clone(&pipeline),
                    Arc::clone(&self.instruments),
                    deadline,
                    self.pause,
                    stop_rx.clone(),
                ))
            })
            .collect();

        let count = producers.len();
        let supervisor = tokio::spawn(async move {
            let mut report = LoadReport {
                producers: count,
                ..LoadReport::default()
            };
            for producer in producers {
                match producer.await {
                    Ok(totals) => report.absorb(totals),
                    Err(e) => log_main!(Level::WARN, error = %e, "load producer failed"),
                }
            }
            log_main!(
                Level::INFO,
                batches = report.batches,
                accepted = report.accepted,
                rejected_batches = report.rejected_batches,
                "load generator finished"
            );
            report
        });

        LoadHandle {
            stop: Arc::new(stop),
            supervisor,
        }
    }
}

fn make_batch<R: Rng + ?Sized>(instruments: &[Instrument], rng: &mut R) -> Vec<Tick> {
    let now = crate::core::now_millis();
    instruments
        .iter()
        .map(|i| Tick::new(i.symbol, i.base_price + rng.gen::<f64>() * i.jitter, now))
        .collect()
}

async fn run_producer<S: PersistenceSink>(
    pipeline: Arc<Pipeline<S>>,
    instruments: Arc<[Instrument]>,
    deadline: Instant,
    pause: Duration,
    mut stop: watch::Receiver<bool>,
) -> LoadReport {
    let mut rng = StdRng::from_entropy();
    let mut totals = LoadReport::default();

    loop {
        if Instant::now() >= deadline || *stop.borrow() {
            break;
        }

        let batch = make_batch(&instruments, &mut rng);
        match pipeline.ingest(&batch) {
            Ok(receipt) => {
                totals.batches += 1;
                totals.accepted += receipt.accepted as u64;
                totals.discarded += receipt.discarded as u64;
            }
            Err(IngestError::Closed) => {
                totals.rejected_batches += 1;
                break;
            }
            Err(e) => {
                log_main!(Level::WARN, error = %e, "load producer stopping");
                break;
            }
        }

        let wake = (Instant::now() + pause).min(deadline);
        tokio::select! {
            _ = sleep_until(wake) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    totals
}

/// Running load generator
pub struct LoadHandle {
    stop: Arc<watch::Sender<bool>>,
    supervisor: JoinHandle<LoadReport>,
}

/// Cloneable stop trigger, e.g. for a ctrl-c task
#[derive(Clone)]
pub struct LoadStopper(Arc<watch::Sender<bool>>);

impl LoadStopper {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

impl LoadHandle {
    pub fn stopper(&self) -> LoadStopper {
        LoadStopper(Arc::clone(&self.stop))
    }

    /// Wait for every producer to finish on its own
    pub async fn join(self) -> Result<LoadReport> {
        self.supervisor
            .await
            .map_err(|e| IngestError::Task(format!("load supervisor: {}", e)))
    }
}
