//! Instruments: one per category of cluster state.
//!
//! Each instrument performs read-only queries and emits its metrics into
//! a sink. Sampling never fails; a failed fetch degrades to `-1` counts or
//! to no emission, depending on the metric.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use cellmetrics_state::StoreClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sink::{MetricSink, Unit};

pub mod domains;
pub mod lrps;
pub mod service_registrations;
pub mod store_health;
pub mod tasks;

pub use domains::DomainInstrument;
pub use lrps::LrpInstrument;
pub use service_registrations::ServiceRegistrationInstrument;
pub use store_health::StoreHealthInstrument;
pub use tasks::TaskInstrument;

/// Value reported for a count whose fetch failed.
pub const UNKNOWN: f64 = -1.0;

/// A sampler bound to one category of state.
pub trait Instrument: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch and emit. Errors are logged and degraded, never returned.
    fn sample(&self, sink: &dyn MetricSink);
}

/// The closed set of instruments the daemon can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Tasks,
    Lrps,
    Domains,
    ServiceRegistrations,
    StoreHealth,
}

impl InstrumentKind {
    /// Every instrument, in default sampling order.
    pub const ALL: [InstrumentKind; 5] = [
        InstrumentKind::Tasks,
        InstrumentKind::Lrps,
        InstrumentKind::Domains,
        InstrumentKind::ServiceRegistrations,
        InstrumentKind::StoreHealth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Tasks => "tasks",
            InstrumentKind::Lrps => "lrps",
            InstrumentKind::Domains => "domains",
            InstrumentKind::ServiceRegistrations => "service_registrations",
            InstrumentKind::StoreHealth => "store_health",
        }
    }

    /// Construct the instrument over `client`.
    pub fn build(&self, client: Arc<dyn StoreClient>) -> Box<dyn Instrument> {
        match self {
            InstrumentKind::Tasks => Box::new(TaskInstrument::new(client)),
            InstrumentKind::Lrps => Box::new(LrpInstrument::new(client)),
            InstrumentKind::Domains => Box::new(DomainInstrument::new(client)),
            InstrumentKind::ServiceRegistrations => {
                Box::new(ServiceRegistrationInstrument::new(client))
            }
            InstrumentKind::StoreHealth => Box::new(StoreHealthInstrument::new(client)),
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown instrument {0:?}")]
pub struct UnknownInstrument(pub String);

impl FromStr for InstrumentKind {
    type Err = UnknownInstrument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstrumentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownInstrument(s.to_string()))
    }
}

/// Emit one count per bucket, or [`UNKNOWN`] for every bucket when the
/// fetch failed. Buckets must cover every value `key_of` can return.
pub(crate) fn emit_counts<T, K: PartialEq>(
    sink: &dyn MetricSink,
    buckets: &[(K, &str)],
    fetched: Option<&[T]>,
    key_of: impl Fn(&T) -> K,
) {
    for (key, metric) in buckets {
        let value = match fetched {
            Some(records) => records.iter().filter(|r| key_of(r) == *key).count() as f64,
            None => UNKNOWN,
        };
        sink.send(metric, value, Unit::Metric);
    }
}
