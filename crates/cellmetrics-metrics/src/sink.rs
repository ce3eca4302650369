//! Metric sinks: where emissions go.
//!
//! Sinks are fire-and-forget: `send` has no result and must not block
//! for long. All sinks here are `Send + Sync` and can be shared between
//! the collector and the HTTP exposition.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

/// Unit attached to every emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Metric,
    BytesPerSecond,
    RequestsPerSecond,
    /// Values are nanoseconds.
    Duration,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Metric => "Metric",
            Unit::BytesPerSecond => "B/s",
            Unit::RequestsPerSecond => "Req/s",
            Unit::Duration => "nanos",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named value.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub name: String,
    pub value: f64,
    pub unit: Unit,
}

impl Emission {
    pub fn new(name: impl Into<String>, value: f64, unit: Unit) -> Self {
        Self {
            name: name.into(),
            value,
            unit,
        }
    }
}

/// Destination for metric emissions.
pub trait MetricSink: Send + Sync {
    fn send(&self, name: &str, value: f64, unit: Unit);

    /// Called once after the last emission of a collection cycle.
    fn end_cycle(&self) {}
}

/// Writes every emission as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn send(&self, name: &str, value: f64, unit: Unit) {
        debug!(metric = %name, value, %unit, "metric emitted");
    }
}

/// Latest complete cycle of gauges, keyed by metric name.
///
/// Emissions are staged until [`MetricSink::end_cycle`] and then replace
/// the published set as a whole, so a metric that a cycle did not emit
/// (a stale domain, a gauge omitted on a failed fetch) disappears.
#[derive(Debug, Default)]
pub struct GaugeRegistry {
    staged: Mutex<BTreeMap<String, (f64, Unit)>>,
    published: RwLock<BTreeMap<String, (f64, Unit)>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published value for `name`, if the last cycle emitted it.
    pub fn get(&self, name: &str) -> Option<Emission> {
        let gauges = self.published.read().unwrap_or_else(|e| e.into_inner());
        gauges
            .get(name)
            .map(|(value, unit)| Emission::new(name, *value, *unit))
    }

    /// The published cycle, ordered by name.
    pub fn snapshot(&self) -> Vec<Emission> {
        let gauges = self.published.read().unwrap_or_else(|e| e.into_inner());
        gauges
            .iter()
            .map(|(name, (value, unit))| Emission::new(name.clone(), *value, *unit))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.published.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricSink for GaugeRegistry {
    fn send(&self, name: &str, value: f64, unit: Unit) {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged.insert(name.to_string(), (value, unit));
    }

    fn end_cycle(&self) {
        let cycle = std::mem::take(&mut *self.staged.lock().unwrap_or_else(|e| e.into_inner()));
        *self.published.write().unwrap_or_else(|e| e.into_inner()) = cycle;
    }
}

/// Records every emission in order. Mostly useful for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    emissions: Mutex<Vec<Emission>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Most recent value emitted under `name`.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|e| e.name == name)
            .map(|e| e.value)
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Emission> {
        std::mem::take(&mut *self.emissions.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl MetricSink for MemorySink {
    fn send(&self, name: &str, value: f64, unit: Unit) {
        self.emissions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Emission::new(name, value, unit));
    }
}

/// Forwards each emission to every inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricSink for FanoutSink {
    fn send(&self, name: &str, value: f64, unit: Unit) {
        for sink in &self.sinks {
            sink.send(name, value, unit);
        }
    }

    fn end_cycle(&self) {
        for sink in &self.sinks {
            sink.end_cycle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_display_strings() {
        assert_eq!(Unit::Metric.to_string(), "Metric");
        assert_eq!(Unit::BytesPerSecond.to_string(), "B/s");
        assert_eq!(Unit::RequestsPerSecond.to_string(), "Req/s");
        assert_eq!(Unit::Duration.to_string(), "nanos");
    }

    #[test]
    fn registry_keeps_latest_value() {
        let registry = GaugeRegistry::new();
        assert!(registry.is_empty());

        registry.send("TasksPending", 3.0, Unit::Metric);
        registry.send("TasksPending", -1.0, Unit::Metric);
        registry.send("StoreWatchers", 12.0, Unit::Metric);
        assert!(registry.is_empty(), "nothing published mid-cycle");
        registry.end_cycle();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("TasksPending"),
            Some(Emission::new("TasksPending", -1.0, Unit::Metric))
        );
        let names: Vec<_> = registry.snapshot().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["StoreWatchers", "TasksPending"]);
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.send("a", 1.0, Unit::Metric);
        sink.send("b", 2.0, Unit::Duration);
        sink.send("a", 3.0, Unit::Metric);

        assert_eq!(sink.last("a"), Some(3.0));
        assert_eq!(sink.last("missing"), None);
        assert_eq!(sink.take().len(), 3);
        assert!(sink.emissions().is_empty());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let registry = Arc::new(GaugeRegistry::new());
        let memory = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new()
            .with(registry.clone())
            .with(memory.clone())
            .with(Arc::new(LogSink));

        fanout.send("LRPsDesired", 5.0, Unit::Metric);
        fanout.end_cycle();

        assert_eq!(registry.get("LRPsDesired").map(|e| e.value), Some(5.0));
        assert_eq!(memory.last("LRPsDesired"), Some(5.0));
    }

    #[test]
    fn registry_drops_metrics_missing_from_the_next_cycle() {
        let registry = GaugeRegistry::new();
        registry.send("Domain.cf-apps", 1.0, Unit::Metric);
        registry.send("StoreRaftTerm", 4.0, Unit::Metric);
        registry.send("TasksPending", 2.0, Unit::Metric);
        registry.end_cycle();
        assert_eq!(registry.len(), 3);

        // Next cycle: the domain went stale and the store fetch failed.
        registry.send("TasksPending", -1.0, Unit::Metric);
        assert_eq!(registry.get("Domain.cf-apps").map(|e| e.value), Some(1.0));
        registry.end_cycle();

        assert_eq!(
            registry.snapshot(),
            vec![Emission::new("TasksPending", -1.0, Unit::Metric)]
        );
        assert!(registry.get("Domain.cf-apps").is_none());
        assert!(registry.get("StoreRaftTerm").is_none());
    }
}
