//! Ingest-side shared state: signature dedup, cached current slot, per-source
//! pipeline counters, the reconnect schedule, and the per-message admission
//! gate. The websocket source itself lives in `ws_source`.

pub mod ws_source;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::metrics::metrics;
use crate::rate_limit::TokenGate;
use crate::rpc::ChainRpc;
use crate::time_utils::now_ms;
use crate::types::{LogMessage, ProgramDescriptor};

/// Socket lifecycle, logged on every transition. `Streaming` is re-entered
/// on each inbound message; `Closing` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Disconnected,
    Connecting,
    Open,
    Streaming,
    Closing,
}

/// Signature → first-seen map with TTL eviction.
pub struct DedupCache {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// First observation within the TTL inserts and returns true; repeats
    /// return false.
    pub fn insert_if_absent(&self, signature: &str) -> bool {
        let mut seen = self.seen.lock().unwrap();
        match seen.get(signature) {
            Some(at) if at.elapsed() < self.ttl => false,
            _ => {
                seen.insert(signature.to_string(), Instant::now());
                true
            }
        }
    }

    pub fn sweep(&self) {
        let mut seen = self.seen.lock().unwrap();
        let before = seen.len();
        seen.retain(|_, at| at.elapsed() < self.ttl);
        let evicted = before - seen.len();
        if evicted > 0 {
            debug!(evicted, remaining = seen.len(), "dedup sweep");
        }
        metrics().set_gauge("dedup_entries", seen.len() as u64);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodic eviction task; stops when notified.
pub fn spawn_dedup_sweeper(
    dedup: Arc<DedupCache>,
    every: Duration,
    stop: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = stop.notified() => break,
                _ = ticker.tick() => dedup.sweep(),
            }
        }
    })
}

/// Current slot, refreshed on demand and trusted for up to `max_age`.
pub struct SlotCache {
    max_age: Duration,
    inner: Mutex<Option<(Instant, u64)>>,
}

impl SlotCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            inner: Mutex::new(None),
        }
    }

    pub async fn current(&self, rpc: &dyn ChainRpc) -> Result<u64> {
        {
            let cached = self.inner.lock().unwrap();
            if let Some((at, slot)) = *cached {
                if at.elapsed() <= self.max_age {
                    return Ok(slot);
                }
            }
        }
        let slot = rpc.current_slot().await?;
        *self.inner.lock().unwrap() = Some((Instant::now(), slot));
        metrics().set_gauge("current_slot", slot);
        Ok(slot)
    }
}

/// Per-source pipeline counters, reported every stats interval.
#[derive(Debug, Default)]
pub struct SourceCounters {
    pub received: AtomicU64,
    pub matches: AtomicU64,
    pub unresolved: AtomicU64,
    pub failures: AtomicU64,
}

pub struct PipelineCounters {
    by_source: HashMap<String, SourceCounters>,
}

impl PipelineCounters {
    pub fn for_descriptors(descriptors: &[ProgramDescriptor]) -> Self {
        Self {
            by_source: descriptors
                .iter()
                .map(|d| (d.label.clone(), SourceCounters::default()))
                .collect(),
        }
    }

    pub fn source(&self, label: &str) -> Option<&SourceCounters> {
        self.by_source.get(label)
    }

    pub fn bump_received(&self, label: &str) {
        if let Some(c) = self.by_source.get(label) {
            c.received.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn bump_matches(&self, label: &str) {
        if let Some(c) = self.by_source.get(label) {
            c.matches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn bump_unresolved(&self, label: &str) {
        if let Some(c) = self.by_source.get(label) {
            c.unresolved.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn bump_failures(&self, label: &str) {
        if let Some(c) = self.by_source.get(label) {
            c.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn log_report(&self) {
        for (label, c) in &self.by_source {
            info!(
                target: "ingest",
                source = %label,
                received = c.received.load(Ordering::Relaxed),
                matches = c.matches.load(Ordering::Relaxed),
                unresolved = c.unresolved.load(Ordering::Relaxed),
                failures = c.failures.load(Ordering::Relaxed),
                "pipeline counters"
            );
        }
    }
}

/// Reconnect schedule: capped exponential backoff, jitter added by the caller.
pub fn reconnect_backoff_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    base_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(max_ms)
}

/// Admission path for one inbound feed message: throttle, dedup, staleness.
pub struct IngestGate {
    pub dedup: Arc<DedupCache>,
    pub slot_cache: Arc<SlotCache>,
    pub counters: Arc<PipelineCounters>,
    pub stale_slot_threshold: u64,
}

impl IngestGate {
    /// Returns the retained message, or `None` when the message is shed.
    pub async fn admit(
        &self,
        throttle: &TokenGate,
        rpc: &dyn ChainRpc,
        source: &str,
        signature: Option<String>,
        slot: u64,
        lines: Vec<String>,
    ) -> Option<LogMessage> {
        self.counters.bump_received(source);

        if !throttle.try_acquire() {
            metrics().bump(&format!("ingest_throttled_{source}"));
            warn!(target: "ingest", source, "message shed by throttle");
            return None;
        }

        let signature = match signature {
            Some(sig) if !sig.is_empty() => sig,
            _ => format!("slot-{slot}"),
        };

        if !self.dedup.insert_if_absent(&signature) {
            metrics().bump(&format!("ingest_duplicate_{source}"));
            debug!(target: "ingest", source, sig = %signature, "duplicate dropped");
            return None;
        }

        match self.slot_cache.current(rpc).await {
            Ok(current) if current.saturating_sub(slot) > self.stale_slot_threshold => {
                metrics().bump(&format!("ingest_stale_{source}"));
                debug!(
                    target: "ingest",
                    source,
                    sig = %signature,
                    lag = current.saturating_sub(slot),
                    "stale message dropped"
                );
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                // Without a trustworthy slot the staleness gate cannot hold;
                // let the message through rather than silently discarding.
                warn!(target: "ingest", error = %e, "slot refresh failed, staleness gate bypassed");
            }
        }

        Some(LogMessage {
            signature,
            slot,
            source_program: source.to_string(),
            lines,
            received_at_ms: now_ms(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_first_in_wins() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(cache.insert_if_absent("sig-A"));
        assert!(!cache.insert_if_absent("sig-A"));
        assert!(cache.insert_if_absent("sig-B"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn dedup_sweep_evicts_expired() {
        let cache = DedupCache::new(Duration::from_millis(0));
        assert!(cache.insert_if_absent("sig-A"));
        cache.sweep();
        assert!(cache.is_empty());
        // Expired entries can be re-inserted.
        assert!(cache.insert_if_absent("sig-A"));
    }

    #[test]
    fn reconnect_backoff_caps_at_max() {
        assert_eq!(reconnect_backoff_ms(0, 500, 30_000), 500);
        assert_eq!(reconnect_backoff_ms(1, 500, 30_000), 1_000);
        assert_eq!(reconnect_backoff_ms(5, 500, 30_000), 16_000);
        // Ten consecutive closes later the delay stays pinned at the cap.
        assert_eq!(reconnect_backoff_ms(10, 500, 30_000), 30_000);
        assert_eq!(reconnect_backoff_ms(63, 500, 30_000), 30_000);
        assert_eq!(reconnect_backoff_ms(64, 500, 30_000), 30_000);
    }

    #[test]
    fn counters_only_track_known_sources() {
        let descriptors = vec![ProgramDescriptor {
            id: 0,
            label: "pumpfun".into(),
            address: solana_sdk::pubkey::Pubkey::new_unique(),
        }];
        let counters = PipelineCounters::for_descriptors(&descriptors);
        counters.bump_received("pumpfun");
        counters.bump_received("unknown");
        assert_eq!(
            counters
                .source("pumpfun")
                .unwrap()
                .received
                .load(Ordering::Relaxed),
            1
        );
        assert!(counters.source("unknown").is_none());
    }
}
