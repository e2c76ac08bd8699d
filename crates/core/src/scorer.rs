//! Opportunity scoring, filtering, deduplication and ranking.
//!
//! All three detectors feed raw candidates through a bounded channel into a
//! single scorer task. The scorer normalizes them into [`MEVOpportunity`]
//! records, applies the global filters, suppresses duplicates inside a
//! sliding window, keeps a short live registry for ranking queries, and
//! pushes accepted records to the external sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mevscan_feed::OpportunitySink;
use mevscan_state::{BlockId, MEVOpportunity, OpportunityKind};

use crate::config::ScoringConfig;
use crate::metrics::EngineMetrics;

/// Raw candidate produced by a detector, before normalization and filtering.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: OpportunityKind,
    pub protocols: SmallVec<[String; 2]>,
    /// Canonical hex ids of the transactions/pools touched, execution order.
    pub involved: SmallVec<[String; 4]>,
    pub gross_profit_usd: f64,
    pub gas_cost_usd: f64,
    pub confidence: f64,
    pub source_block: BlockId,
    /// When the snapshot the detector read was taken.
    pub snapshot_taken: Instant,
    pub detected_at: DateTime<Utc>,
}

impl Candidate {
    pub fn net_profit_usd(&self) -> f64 {
        self.gross_profit_usd - self.gas_cost_usd
    }
}

#[derive(Debug)]
struct DedupEntry {
    last_net_profit: f64,
    seen_at: Instant,
}

#[derive(Debug, Clone)]
struct EmittedRecord {
    opportunity: MEVOpportunity,
    invalidated: bool,
    emitted_at: Instant,
}

/// The scorer/deduplicator stage.
pub struct Scorer {
    config: ScoringConfig,
    metrics: Arc<EngineMetrics>,
    dedup: DashMap<String, DedupEntry>,
    emitted: DashMap<String, EmittedRecord>,
    seq: AtomicU64,
}

impl Scorer {
    pub fn new(config: ScoringConfig, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            config,
            metrics,
            dedup: DashMap::new(),
            emitted: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Consume candidates until the channel closes, pushing accepted records
    /// to the sink. Sink failures are logged, never propagated upstream.
    pub async fn run(
        self: Arc<Self>,
        mut intake: mpsc::Receiver<Candidate>,
        sink: Arc<dyn OpportunitySink>,
    ) {
        info!("scorer task started");
        while let Some(candidate) = intake.recv().await {
            if let Some(opportunity) = self.process(candidate) {
                if let Err(e) = sink.emit(&opportunity).await {
                    warn!(error = %e, id = %opportunity.id, "sink emission failed");
                }
            }
        }
        info!("scorer task stopped (intake closed)");
    }

    /// Normalize, filter and dedup one candidate. `None` means filtered or
    /// suppressed.
    pub fn process(&self, candidate: Candidate) -> Option<MEVOpportunity> {
        let net = candidate.net_profit_usd();

        if net < self.config.min_net_profit_usd {
            debug!(
                kind = candidate.kind.as_str(),
                net_profit_usd = net,
                "candidate below profit floor"
            );
            return None;
        }
        if candidate.confidence < self.config.min_confidence {
            debug!(
                kind = candidate.kind.as_str(),
                confidence = candidate.confidence,
                "candidate below confidence floor"
            );
            return None;
        }
        if candidate.snapshot_taken.elapsed() > self.config.max_snapshot_age() {
            debug!(
                kind = candidate.kind.as_str(),
                "candidate snapshot too old at scoring time"
            );
            return None;
        }

        let dedup_key = MEVOpportunity::dedup_key_for(candidate.kind, &candidate.involved);

        // Sliding-window suppression: the same key inside the window only
        // passes again when profit improved materially.
        let window = self.config.dedup_window();
        let reemit_factor = 1.0 + self.config.reemit_delta_pct / 100.0;
        if let Some(entry) = self.dedup.get(&dedup_key) {
            if entry.seen_at.elapsed() < window && net < entry.last_net_profit * reemit_factor {
                EngineMetrics::incr(&self.metrics.opportunities_suppressed);
                debug!(key = %dedup_key, "duplicate opportunity suppressed");
                return None;
            }
        }
        self.dedup.insert(
            dedup_key.clone(),
            DedupEntry {
                last_net_profit: net,
                seen_at: Instant::now(),
            },
        );

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let opportunity = MEVOpportunity {
            id: format!(
                "{}-{}-{}",
                candidate.kind.as_str(),
                candidate.source_block.height,
                seq
            ),
            kind: candidate.kind,
            protocols: candidate.protocols,
            involved: candidate.involved,
            gross_profit_usd: candidate.gross_profit_usd,
            gas_cost_usd: candidate.gas_cost_usd,
            net_profit_usd: net,
            confidence: candidate.confidence,
            detected_at: candidate.detected_at,
            source_block: candidate.source_block,
            dedup_key,
        };

        self.emitted.insert(
            opportunity.id.clone(),
            EmittedRecord {
                opportunity: opportunity.clone(),
                invalidated: false,
                emitted_at: Instant::now(),
            },
        );
        EngineMetrics::incr(&self.metrics.opportunities_emitted);
        Some(opportunity)
    }

    /// Mark every live record sourced at or above `height` as invalidated;
    /// they are excluded from subsequent ranking queries. Called on reorg.
    pub fn invalidate_from(&self, height: u64) -> usize {
        let mut count = 0;
        for mut record in self.emitted.iter_mut() {
            if !record.invalidated && record.opportunity.source_block.height >= height {
                record.invalidated = true;
                count += 1;
                EngineMetrics::incr(&self.metrics.opportunities_invalidated);
            }
        }
        if count > 0 {
            info!(height, count, "opportunities invalidated by reorg");
        }
        count
    }

    /// Live, valid records ranked by net profit desc, confidence desc,
    /// detection time asc (stable ordering).
    pub fn ranked(&self) -> Vec<MEVOpportunity> {
        let mut live: Vec<MEVOpportunity> = self
            .emitted
            .iter()
            .filter(|r| !r.invalidated)
            .map(|r| r.opportunity.clone())
            .collect();

        live.sort_by(|a, b| {
            b.net_profit_usd
                .total_cmp(&a.net_profit_usd)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.detected_at.cmp(&b.detected_at))
        });
        live
    }

    /// Drop expired dedup entries and aged-out records. Called from the
    /// orchestrator's housekeeping sweep.
    pub fn expire(&self) {
        let window = self.config.dedup_window();
        self.dedup.retain(|_, entry| entry.seen_at.elapsed() < window);
        // Records linger one extra window for late ranking queries.
        self.emitted
            .retain(|_, record| record.emitted_at.elapsed() < window * 2);
    }

    /// Number of live (non-invalidated) records.
    pub fn live_count(&self) -> usize {
        self.emitted.iter().filter(|r| !r.invalidated).count()
    }
}
