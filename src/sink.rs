//! Metric backend port
//!
//! The engine never talks to a concrete metric store; it resolves serialized
//! tag identities to opaque handles through `MetricSink` and records against
//! those. `MemorySink` is the reference implementation used by tests and
//! embedders that want to scrape values directly.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Metric kinds supported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Opaque handle to a fully-resolved backend metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(pub u32);

/// Create-or-fetch metric backend.
///
/// `resolve_full_name` must return the same id for the same full name, so
/// the resolved-stat cache is the only thing standing between the engine and
/// duplicate handles.
pub trait MetricSink {
    fn resolve_full_name(&self, kind: MetricKind, full_name: &str) -> MetricId;

    /// Add a delta to a counter.
    fn increment(&self, id: MetricId, delta: u64);

    /// Record a value on a gauge or histogram.
    fn record(&self, id: MetricId, value: u64);
}

/// Serialize static tags and a metric name into the backend identity string.
pub fn joined_name(
    name: &str,
    tags: &[(&str, &str)],
    field_separator: &str,
    value_separator: &str,
) -> String {
    let mut full = String::new();
    for (tag, value) in tags {
        full.push_str(tag);
        full.push_str(value_separator);
        full.push_str(value);
        full.push_str(field_separator);
    }
    full.push_str(name);
    full
}

#[derive(Debug)]
struct MetricState {
    kind: MetricKind,
    name: String,
    counter: u64,
    gauge: u64,
    samples: Vec<u64>,
}

#[derive(Default)]
struct MemorySinkInner {
    by_name: HashMap<String, MetricId>,
    metrics: Vec<MetricState>,
}

/// In-memory metric store.
#[derive(Default)]
pub struct MemorySink {
    inner: RwLock<MemorySinkInner>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct handles created so far.
    pub fn handle_count(&self) -> usize {
        self.inner.read().metrics.len()
    }

    /// All resolved full names, in creation order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .metrics
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    /// Full names containing the given fragment.
    pub fn find_names(&self, fragment: &str) -> Vec<String> {
        self.inner
            .read()
            .metrics
            .iter()
            .filter(|m| m.name.contains(fragment))
            .map(|m| m.name.clone())
            .collect()
    }

    /// Current value of a counter, zero if never incremented.
    pub fn counter_value(&self, full_name: &str) -> u64 {
        let inner = self.inner.read();
        inner
            .by_name
            .get(full_name)
            .map(|id| inner.metrics[id.0 as usize].counter)
            .unwrap_or(0)
    }

    /// Last value recorded on a gauge.
    pub fn gauge_value(&self, full_name: &str) -> Option<u64> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(full_name)
            .map(|id| inner.metrics[id.0 as usize].gauge)
    }

    /// All values recorded on a histogram.
    pub fn histogram_samples(&self, full_name: &str) -> Vec<u64> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(full_name)
            .map(|id| inner.metrics[id.0 as usize].samples.clone())
            .unwrap_or_default()
    }
}

impl MetricSink for MemorySink {
    fn resolve_full_name(&self, kind: MetricKind, full_name: &str) -> MetricId {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.by_name.get(full_name) {
            return id;
        }
        let id = MetricId(inner.metrics.len() as u32);
        inner.metrics.push(MetricState {
            kind,
            name: full_name.to_string(),
            counter: 0,
            gauge: 0,
            samples: Vec::new(),
        });
        inner.by_name.insert(full_name.to_string(), id);
        id
    }

    fn increment(&self, id: MetricId, delta: u64) {
        let mut inner = self.inner.write();
        if let Some(metric) = inner.metrics.get_mut(id.0 as usize) {
            metric.counter += delta;
        }
    }

    fn record(&self, id: MetricId, value: u64) {
        let mut inner = self.inner.write();
        if let Some(metric) = inner.metrics.get_mut(id.0 as usize) {
            match metric.kind {
                MetricKind::Counter => metric.counter += value,
                MetricKind::Gauge => metric.gauge = value,
                MetricKind::Histogram => metric.samples.push(value),
            }
        }
    }
}
