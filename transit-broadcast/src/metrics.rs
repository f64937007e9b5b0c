//! Append-only performance metric stream. Business logic never reads these;
//! they exist for the sink alone.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Metric families emitted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Latency,
    Throughput,
    QueueSize,
    DropRate,
    ConnectionCount,
}

/// One observation. `operation` labels the code path that produced it, for
/// drop metrics including the affected client id.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfMetric {
    pub kind: MetricKind,
    pub operation: String,
    pub value: f64,
    pub unit: &'static str,
    pub timestamp: DateTime<Utc>,
    pub tags: HashMap<String, String>,
}

impl PerfMetric {
    pub fn new(
        kind: MetricKind,
        operation: impl Into<String>,
        value: f64,
        unit: &'static str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            value,
            unit,
            timestamp,
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Fire-and-forget metric sink. Implementations must not block and must not
/// fail the caller.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: PerfMetric);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _metric: PerfMetric) {}
}

/// Sink that keeps every observation in memory, for tests and the demo.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    records: Mutex<Vec<PerfMetric>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of everything recorded so far.
    pub fn recorded(&self) -> Vec<PerfMetric> {
        self.records.lock().expect("metrics lock poisoned").clone()
    }

    /// Number of recorded observations of the given kind.
    pub fn count_of(&self, kind: MetricKind) -> usize {
        self.records
            .lock()
            .expect("metrics lock poisoned")
            .iter()
            .filter(|metric| metric.kind == kind)
            .count()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record(&self, metric: PerfMetric) {
        self.records
            .lock()
            .expect("metrics lock poisoned")
            .push(metric);
    }
}
