//! cellmetrics-metrics: turns cluster state into metrics.
//!
//! Instruments read one category of records from a
//! [`StoreClient`](cellmetrics_state::StoreClient) and emit named values
//! into a [`MetricSink`]. The [`MetricsCollector`] runs every configured
//! instrument once per interval and reports how long the batch took.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   ├── run() → ticker loop until shutdown
//!   └── run_cycle()
//!         ├── Instrument::sample() × N (in order)
//!         └── MetricsReportingDuration
//!
//! MetricSink
//!   ├── LogSink        → tracing events
//!   ├── GaugeRegistry  → latest value per name → render_prometheus()
//!   └── FanoutSink     → several of the above
//! ```
//!
//! # Degrade policy
//!
//! Counts whose fetch failed are reported as `-1` ("unknown"). Set
//! membership metrics (fresh domains) are simply not emitted, and neither
//! are the non-count gauges of the store-health instrument.

pub mod collector;
pub mod instruments;
pub mod prometheus;
pub mod sink;

pub use collector::{MetricsCollector, SampleCycle, METRICS_REPORTING_DURATION};
pub use instruments::{Instrument, InstrumentKind, UNKNOWN};
pub use prometheus::render_prometheus;
pub use sink::{Emission, FanoutSink, GaugeRegistry, LogSink, MemorySink, MetricSink, Unit};
