//! Metrics collector: samples every instrument once per interval.
//!
//! A cycle runs the instruments in order, reports its own wall-clock
//! cost as `MetricsReportingDuration`, then closes the cycle on the sink. Cycles never overlap: a cycle that
//! overruns the interval delays the next tick instead of queueing a burst.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::instruments::Instrument;
use crate::sink::{MetricSink, Unit};

/// Name of the per-cycle duration metric.
pub const METRICS_REPORTING_DURATION: &str = "MetricsReportingDuration";

/// Timing of one completed cycle.
#[derive(Debug, Clone, Copy)]
pub struct SampleCycle {
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl SampleCycle {
    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

pub struct MetricsCollector {
    instruments: Vec<Box<dyn Instrument>>,
    sink: Arc<dyn MetricSink>,
    interval: Duration,
    cycles: AtomicU64,
}

impl MetricsCollector {
    /// `interval` must be non-zero; configuration validation enforces it.
    pub fn new(
        instruments: Vec<Box<dyn Instrument>>,
        sink: Arc<dyn MetricSink>,
        interval: Duration,
    ) -> Self {
        Self {
            instruments,
            sink,
            interval,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn instrument_names(&self) -> Vec<&'static str> {
        self.instruments.iter().map(|i| i.name()).collect()
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Sample every instrument once and report the elapsed time.
    pub fn run_cycle(&self) -> SampleCycle {
        let started_at = Instant::now();
        for instrument in &self.instruments {
            instrument.sample(self.sink.as_ref());
        }
        let finished_at = Instant::now();

        let cycle = SampleCycle {
            started_at,
            finished_at,
        };
        self.sink.send(
            METRICS_REPORTING_DURATION,
            cycle.duration().as_nanos() as f64,
            Unit::Duration,
        );
        self.sink.end_cycle();
        self.cycles.fetch_add(1, Ordering::Relaxed);
        cycle
    }

    /// Run cycles on the interval until shutdown.
    ///
    /// The first cycle starts one interval after the call. Shutdown is
    /// observed between cycles only; it wins over a tick that is ready at
    /// the same moment.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            instruments = ?self.instrument_names(),
            "metrics collector started"
        );

        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let cycle = self.run_cycle();
                    debug!(
                        cycle = self.cycles(),
                        duration_us = cycle.duration().as_micros() as u64,
                        "metrics cycle complete"
                    );
                }
            }
        }

        info!(cycles = self.cycles(), "metrics collector shutting down");
    }
}
