//! Engine metrics.
//!
//! Plain atomic counters; an external monitor polls [`EngineMetrics::snapshot`]
//! as the health signal. Nothing here can fail or block a hot path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared across the pipeline.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub events_ingested: AtomicU64,
    pub decode_rejects: AtomicU64,
    pub stale_rejects: AtomicU64,
    pub detector_timeouts: AtomicU64,
    pub detector_faults: AtomicU64,
    pub candidates_produced: AtomicU64,
    pub candidates_dropped: AtomicU64,
    pub opportunities_emitted: AtomicU64,
    pub opportunities_suppressed: AtomicU64,
    pub opportunities_invalidated: AtomicU64,
    pub reorgs_handled: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            decode_rejects: self.decode_rejects.load(Ordering::Relaxed),
            stale_rejects: self.stale_rejects.load(Ordering::Relaxed),
            detector_timeouts: self.detector_timeouts.load(Ordering::Relaxed),
            detector_faults: self.detector_faults.load(Ordering::Relaxed),
            candidates_produced: self.candidates_produced.load(Ordering::Relaxed),
            candidates_dropped: self.candidates_dropped.load(Ordering::Relaxed),
            opportunities_emitted: self.opportunities_emitted.load(Ordering::Relaxed),
            opportunities_suppressed: self.opportunities_suppressed.load(Ordering::Relaxed),
            opportunities_invalidated: self.opportunities_invalidated.load(Ordering::Relaxed),
            reorgs_handled: self.reorgs_handled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_ingested: u64,
    pub decode_rejects: u64,
    pub stale_rejects: u64,
    pub detector_timeouts: u64,
    pub detector_faults: u64,
    pub candidates_produced: u64,
    pub candidates_dropped: u64,
    pub opportunities_emitted: u64,
    pub opportunities_suppressed: u64,
    pub opportunities_invalidated: u64,
    pub reorgs_handled: u64,
}

impl MetricsSnapshot {
    /// Sustained rejection of inbound updates is the engine's "something is
    /// wrong upstream" signal: either the feed replays stale heights or the
    /// decoder produces garbage.
    pub fn reject_ratio(&self) -> f64 {
        if self.events_ingested == 0 {
            return 0.0;
        }
        (self.decode_rejects + self.stale_rejects) as f64 / self.events_ingested as f64
    }
}
