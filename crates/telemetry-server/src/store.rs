//! In-memory metric store.
//!
//! Two maps behind one coarse lock: metric cardinality is small and every
//! operation is cheap, so a single critical section beats finer locking.
//! Nothing hands out references into the maps; external consumers get a
//! [`StoreSnapshot`] copy.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use telemetry_types::MetricKind;
use telemetry_types::MetricValue;

/// Point-in-time copy of the whole store.
///
/// Also the on-disk JSON shape: `{"gauge": {...}, "counter": {...}}`.
/// Ordered maps keep dumped files diffable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(rename = "gauge", default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(rename = "counter", default)]
    pub counters: BTreeMap<String, i64>,
}

#[derive(Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Concurrent store of gauges (last write wins) and counters (sum of deltas).
#[derive(Default)]
pub struct MetricStore {
    inner: Mutex<Maps>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a gauge.
    pub fn update_gauge(&self, name: &str, value: f64) {
        let mut maps = self.lock();
        maps.gauges.insert(name.to_string(), value);
    }

    /// Add a delta to a counter, creating it at zero first.
    pub fn update_counter(&self, name: &str, delta: i64) {
        let mut maps = self.lock();
        let entry = maps.counters.entry(name.to_string()).or_insert(0);
        *entry = entry.saturating_add(delta);
    }

    /// Apply one validated metric value under `name`.
    pub fn apply(&self, name: &str, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => self.update_gauge(name, v),
            MetricValue::Counter(d) => self.update_counter(name, d),
        }
    }

    /// Textual value of a metric, or `None` when absent.
    pub fn value(&self, kind: MetricKind, name: &str) -> Option<String> {
        let maps = self.lock();
        match kind {
            MetricKind::Gauge => maps.gauges.get(name).map(|v| format!("{v}")),
            MetricKind::Counter => maps.counters.get(name).map(|v| format!("{v}")),
        }
    }

    /// Typed value of a metric, or `None` when absent.
    pub fn typed_value(&self, kind: MetricKind, name: &str) -> Option<MetricValue> {
        let maps = self.lock();
        match kind {
            MetricKind::Gauge => maps.gauges.get(name).copied().map(MetricValue::Gauge),
            MetricKind::Counter => maps.counters.get(name).copied().map(MetricValue::Counter),
        }
    }

    /// Full copy of both maps, safe against later mutation.
    pub fn snapshot(&self) -> StoreSnapshot {
        let maps = self.lock();
        StoreSnapshot {
            gauges: maps.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            counters: maps.counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }

    /// Replace the whole store with a snapshot's contents.
    pub fn replace(&self, snapshot: StoreSnapshot) {
        let mut maps = self.lock();
        maps.gauges = snapshot.gauges.into_iter().collect();
        maps.counters = snapshot.counters.into_iter().collect();
    }

    /// Human-readable listing for the index page.
    pub fn render_text(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::from("Gauge metrics:\n");
        for (name, value) in &snapshot.gauges {
            out.push_str(&format!("- {name} = {value}\n"));
        }
        out.push_str("Counter metrics:\n");
        for (name, value) in &snapshot.counters {
            out.push_str(&format!("- {name} = {value}\n"));
        }
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Maps> {
        self.inner.lock().expect("metric store lock poisoned")
    }
}
