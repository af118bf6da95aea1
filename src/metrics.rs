//! In-process metrics registry: counters, gauges, duration histograms.
//!
//! Counter names are flat strings (`rpc_request_attempt_getSlot`,
//! `ingest_throttled_pumpfun`). The registry is process-global; subsystems
//! reach it through `metrics()`.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock, RwLock,
    },
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicU64>>>,
    durations: RwLock<HashMap<String, Arc<RwLock<Vec<u64>>>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, value: u64) {
        if let Some(counter) = self.counters.read().unwrap().get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        let mut counters = self.counters.write().unwrap();
        counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn set_gauge(&self, name: &str, value: u64) {
        if let Some(gauge) = self.gauges.read().unwrap().get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        let mut gauges = self.gauges.write().unwrap();
        gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .store(value, Ordering::Relaxed);
    }

    pub fn observe(&self, name: &str, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        if let Some(series) = self.durations.read().unwrap().get(name) {
            Self::push_bounded(series, ms);
            return;
        }
        let mut durations = self.durations.write().unwrap();
        let series = durations
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .clone();
        Self::push_bounded(&series, ms);
    }

    fn push_bounded(series: &Arc<RwLock<Vec<u64>>>, ms: u64) {
        let mut values = series.write().unwrap();
        values.push(ms);
        if values.len() > 1024 {
            values.drain(0..512);
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> u64 {
        self.gauges
            .read()
            .unwrap()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn duration_stats(&self, name: &str) -> Option<DurationStats> {
        let durations = self.durations.read().unwrap();
        let series = durations.get(name)?;
        let values = series.read().unwrap();
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.clone();
        sorted.sort_unstable();
        let n = sorted.len();
        Some(DurationStats {
            count: n as u64,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            p50_ms: sorted[n / 2],
            p95_ms: sorted[n * 95 / 100],
            p99_ms: sorted[n * 99 / 100],
        })
    }

    pub fn export(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        let gauges = self
            .gauges
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        let names: Vec<String> = self.durations.read().unwrap().keys().cloned().collect();
        let durations = names
            .into_iter()
            .filter_map(|k| self.duration_stats(&k).map(|s| (k, s)))
            .collect();
        MetricsSnapshot {
            counters,
            gauges,
            durations,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DurationStats {
    pub count: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, u64>,
    pub durations: HashMap<String, DurationStats>,
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}

/// Measures a span and records it on drop-less `finish()`.
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        metrics().observe(&self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let registry = MetricsRegistry::new();
        registry.bump("dispatches");
        registry.add("dispatches", 4);
        assert_eq!(registry.counter("dispatches"), 5);
        assert_eq!(registry.counter("missing"), 0);
    }

    #[test]
    fn gauges_overwrite() {
        let registry = MetricsRegistry::new();
        registry.set_gauge("current_slot", 100);
        registry.set_gauge("current_slot", 250);
        assert_eq!(registry.gauge("current_slot"), 250);
    }

    #[test]
    fn duration_stats_sorted() {
        let registry = MetricsRegistry::new();
        registry.observe("decode", Duration::from_millis(30));
        registry.observe("decode", Duration::from_millis(10));
        registry.observe("decode", Duration::from_millis(20));
        let stats = registry.duration_stats("decode").unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_ms, 10);
        assert_eq!(stats.max_ms, 30);
    }

    #[test]
    fn export_includes_everything() {
        let registry = MetricsRegistry::new();
        registry.bump("a");
        registry.set_gauge("b", 7);
        registry.observe("c", Duration::from_millis(5));
        let snapshot = registry.export();
        assert_eq!(snapshot.counters.get("a"), Some(&1));
        assert_eq!(snapshot.gauges.get("b"), Some(&7));
        assert!(snapshot.durations.contains_key("c"));
    }
}
