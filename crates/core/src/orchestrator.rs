//! Detection orchestration.
//!
//! Routes every inbound event through the World State Store first, then fans
//! it out to the detectors subscribed to its kind via an explicit
//! subscription table. Each fan-out carries a per-event deadline; detector
//! invocations that miss it are abandoned with their partial results
//! discarded, and a timeout metric recorded. Candidates flow to the scorer
//! over a bounded channel; overflow drops are counted, never buffered
//! without bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use smallvec::SmallVec;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use mevscan_feed::EventSource;
use mevscan_state::{
    EventKind, InboundEvent, PendingTransaction, StateError, WorldStateStore,
};

use crate::arbitrage::ArbitrageDetector;
use crate::config::OrchestratorConfig;
use crate::deadline::Deadline;
use crate::error::DetectError;
use crate::liquidation::LiquidationMonitor;
use crate::metrics::EngineMetrics;
use crate::sandwich::SandwichDetector;
use crate::scorer::{Candidate, Scorer};

/// Detector handles addressable from the subscription table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorId {
    Arbitrage,
    Liquidation,
    Sandwich,
}

/// The detection orchestrator.
pub struct Orchestrator {
    store: Arc<WorldStateStore>,
    arbitrage: Arc<ArbitrageDetector>,
    liquidation: Arc<LiquidationMonitor>,
    sandwich: Arc<SandwichDetector>,
    scorer: Arc<Scorer>,
    intake: mpsc::Sender<Candidate>,
    metrics: Arc<EngineMetrics>,
    config: OrchestratorConfig,
    /// Explicit event-kind → detector routing; no reflection, no dynamic
    /// registration.
    subscriptions: HashMap<EventKind, SmallVec<[DetectorId; 3]>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<WorldStateStore>,
        arbitrage: Arc<ArbitrageDetector>,
        liquidation: Arc<LiquidationMonitor>,
        sandwich: Arc<SandwichDetector>,
        scorer: Arc<Scorer>,
        intake: mpsc::Sender<Candidate>,
        metrics: Arc<EngineMetrics>,
        config: OrchestratorConfig,
    ) -> Self {
        let mut subscriptions: HashMap<EventKind, SmallVec<[DetectorId; 3]>> = HashMap::new();
        subscriptions.insert(
            EventKind::PriceOrReserveUpdate,
            SmallVec::from_slice(&[DetectorId::Arbitrage, DetectorId::Liquidation]),
        );
        subscriptions.insert(
            EventKind::PendingTransactionSeen,
            SmallVec::from_slice(&[DetectorId::Sandwich]),
        );
        subscriptions.insert(
            EventKind::PositionChanged,
            SmallVec::from_slice(&[DetectorId::Liquidation]),
        );

        Self {
            store,
            arbitrage,
            liquidation,
            sandwich,
            scorer,
            intake,
            metrics,
            config,
            subscriptions,
        }
    }

    /// Detectors subscribed to an event kind (introspection and tests).
    pub fn subscribers(&self, kind: EventKind) -> &[DetectorId] {
        self.subscriptions
            .get(&kind)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    /// Consume events until the source closes, sweeping housekeeping on a
    /// ticker in between.
    pub async fn run(&self, mut source: impl EventSource) {
        info!("orchestrator event loop started");
        let mut sweeper = interval(self.config.sweep_interval());

        loop {
            tokio::select! {
                event = source.next_event() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                _ = sweeper.tick() => {
                    self.sweep();
                }
            }
        }
        info!("orchestrator event loop stopped (source closed)");
    }

    /// Process one inbound event end to end.
    #[instrument(skip(self, event), fields(kind = ?event.kind()))]
    pub async fn handle_event(&self, event: InboundEvent) {
        EngineMetrics::incr(&self.metrics.events_ingested);

        match &event {
            InboundEvent::ReorgNotice {
                common_ancestor_height,
                ..
            } => {
                self.handle_reorg(*common_ancestor_height);
                return;
            }
            InboundEvent::TransactionConfirmed { tx_id, .. } => {
                self.sandwich.confirm(tx_id);
                return;
            }
            InboundEvent::PendingTransactionSeen {
                tx_id,
                sender,
                target,
                swap,
                gas_price_wei,
                observed_at,
            } => {
                self.sandwich.observe(PendingTransaction {
                    tx_id: *tx_id,
                    sender: *sender,
                    target: *target,
                    swap: swap.clone(),
                    gas_price_wei: *gas_price_wei,
                    observed_at: *observed_at,
                    seen: Instant::now(),
                });
            }
            _ => {
                // World state first; detectors only ever see committed state.
                match self.store.apply_update(&event) {
                    Ok(outcome) => {
                        debug!(
                            pools = outcome.pools_updated,
                            prices = outcome.prices_updated,
                            positions = outcome.positions_updated,
                            "state update applied"
                        );
                    }
                    Err(StateError::StaleUpdate { key, height, committed }) => {
                        EngineMetrics::incr(&self.metrics.stale_rejects);
                        debug!(key = %key, height, committed, "stale update rejected, detection skipped");
                        return;
                    }
                    Err(StateError::RollbackInProgress { below }) => {
                        EngineMetrics::incr(&self.metrics.stale_rejects);
                        warn!(below, "update arrived during rollback, dropped");
                        return;
                    }
                    Err(e) => {
                        EngineMetrics::incr(&self.metrics.decode_rejects);
                        warn!(error = %e, "inconsistent update dropped");
                        return;
                    }
                }
            }
        }

        self.dispatch(&event).await;
    }

    /// Fan the event out to its subscribed detectors and forward whatever
    /// they produce.
    async fn dispatch(&self, event: &InboundEvent) {
        let Some(subscribed) = self.subscriptions.get(&event.kind()) else {
            return;
        };

        let snap = self.store.snapshot();
        let deadline = Deadline::after(self.config.event_deadline());

        type DetectResult = Result<Vec<Candidate>, DetectError>;
        let mut invocations: Vec<(DetectorId, tokio::task::JoinHandle<DetectResult>)> =
            Vec::new();

        for id in subscribed {
            match (id, event) {
                (
                    DetectorId::Arbitrage,
                    InboundEvent::PriceOrReserveUpdate { pool_id, reserves, .. },
                ) => {
                    // A pure price tick moves no reserves; the rate graph is
                    // unchanged.
                    if reserves.is_none() {
                        continue;
                    }
                    let detector = self.arbitrage.clone();
                    let snap = snap.clone();
                    let pool_id = *pool_id;
                    invocations.push((
                        DetectorId::Arbitrage,
                        tokio::spawn(async move { detector.detect(&pool_id, &snap, &deadline) }),
                    ));
                }
                (
                    DetectorId::Liquidation,
                    InboundEvent::PriceOrReserveUpdate { token_prices, .. },
                ) => {
                    if token_prices.is_empty() {
                        continue;
                    }
                    let detector = self.liquidation.clone();
                    let snap = snap.clone();
                    let changed = token_prices.to_vec();
                    invocations.push((
                        DetectorId::Liquidation,
                        tokio::spawn(async move {
                            detector.detect_price(&changed, &snap, &deadline)
                        }),
                    ));
                }
                (
                    DetectorId::Liquidation,
                    InboundEvent::PositionChanged { position_id, .. },
                ) => {
                    let detector = self.liquidation.clone();
                    let snap = snap.clone();
                    let position_id = *position_id;
                    invocations.push((
                        DetectorId::Liquidation,
                        tokio::spawn(async move {
                            detector.on_position_changed(&position_id, &snap, &deadline)
                        }),
                    ));
                }
                (
                    DetectorId::Sandwich,
                    InboundEvent::PendingTransactionSeen { tx_id, .. },
                ) => {
                    let detector = self.sandwich.clone();
                    let snap = snap.clone();
                    let tx_id = *tx_id;
                    invocations.push((
                        DetectorId::Sandwich,
                        tokio::spawn(async move { detector.detect(&tx_id, &snap, &deadline) }),
                    ));
                }
                _ => {}
            }
        }

        let (ids, handles): (Vec<_>, Vec<_>) = invocations.into_iter().unzip();
        for (id, joined) in ids.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(candidates)) => self.forward(candidates),
                Ok(Err(DetectError::DeadlineExceeded)) => {
                    EngineMetrics::incr(&self.metrics.detector_timeouts);
                    debug!(detector = ?id, "invocation abandoned at deadline");
                }
                Ok(Err(e)) => {
                    // One detector's fault never blocks the others; it only
                    // ever read a snapshot.
                    EngineMetrics::incr(&self.metrics.detector_faults);
                    warn!(detector = ?id, error = %e, "detector fault isolated");
                }
                Err(e) => {
                    EngineMetrics::incr(&self.metrics.detector_faults);
                    error!(detector = ?id, error = %e, "detector task panicked");
                }
            }
        }
    }

    /// Push candidates toward the scorer. The channel is bounded; a full
    /// scorer drops the overflow with a recorded count instead of stalling
    /// event processing.
    fn forward(&self, candidates: Vec<Candidate>) {
        for candidate in candidates {
            EngineMetrics::incr(&self.metrics.candidates_produced);
            match self.intake.try_send(candidate) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    EngineMetrics::incr(&self.metrics.candidates_dropped);
                    debug!("scorer intake full, candidate dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    EngineMetrics::incr(&self.metrics.candidates_dropped);
                    warn!("scorer intake closed, candidate dropped");
                }
            }
        }
    }

    /// Reorg: pause-and-rollback the store, then invalidate every live
    /// opportunity sourced above the common ancestor. In-flight detections
    /// on orphaned snapshots die at the scorer, not here.
    fn handle_reorg(&self, common_ancestor_height: u64) {
        EngineMetrics::incr(&self.metrics.reorgs_handled);
        warn!(common_ancestor_height, "reorg notice received");

        let discarded = self.store.rollback(common_ancestor_height);
        let invalidated = self.scorer.invalidate_from(common_ancestor_height + 1);
        self.liquidation.invalidate_caches();

        info!(
            common_ancestor_height,
            discarded_versions = discarded,
            invalidated_opportunities = invalidated,
            "reorg rollback complete"
        );
    }

    /// Periodic housekeeping: pending-tx TTLs and dedup-window expiry.
    fn sweep(&self) {
        let evicted = self.sandwich.evict_expired();
        self.scorer.expire();
        if evicted > 0 {
            debug!(evicted, "sweep complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256, U256};
    use chrono::Utc;
    use mevscan_feed::StaticGasOracle;
    use mevscan_state::{
        BlockId, OpportunityKind, Pool, PoolKind, ReserveUpdate, Token,
    };
    use smallvec::smallvec;

    use crate::config::{
        ArbitrageConfig, LiquidationConfig, SandwichConfig, ScoringConfig,
    };

    const DEC: u8 = 18;
    const UNIT: u128 = 1_000_000_000_000_000_000;

    struct Harness {
        orchestrator: Orchestrator,
        scorer: Arc<Scorer>,
        metrics: Arc<EngineMetrics>,
        intake_rx: mpsc::Receiver<Candidate>,
        store: Arc<WorldStateStore>,
    }

    fn harness(intake_capacity: usize) -> Harness {
        let store = Arc::new(WorldStateStore::new());
        let gas: Arc<StaticGasOracle> = Arc::new(StaticGasOracle::new(0, 0.0));
        let metrics = Arc::new(EngineMetrics::new());

        let scoring = ScoringConfig {
            min_net_profit_usd: 0.1,
            min_confidence: 0.01,
            ..Default::default()
        };
        let scorer = Arc::new(Scorer::new(scoring, metrics.clone()));

        let arbitrage = Arc::new(ArbitrageDetector::new(
            ArbitrageConfig {
                probe_capital_usd: 10.0,
                ..Default::default()
            },
            gas.clone(),
        ));
        let liquidation = Arc::new(LiquidationMonitor::new(
            LiquidationConfig::default(),
            gas.clone(),
        ));
        let sandwich = Arc::new(SandwichDetector::new(SandwichConfig::default(), gas));

        let (intake_tx, intake_rx) = mpsc::channel(intake_capacity);
        let orchestrator = Orchestrator::new(
            store.clone(),
            arbitrage,
            liquidation,
            sandwich,
            scorer.clone(),
            intake_tx,
            metrics.clone(),
            OrchestratorConfig::default(),
        );

        Harness {
            orchestrator,
            scorer,
            metrics,
            intake_rx,
            store,
        }
    }

    fn token(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn cycle_pools(store: &Arc<WorldStateStore>) {
        let genesis = BlockId::new(1, B256::repeat_byte(1));
        let mk = |id: u8, t0: u8, t1: u8, r0: u128, r1: u128| Pool {
            id: Address::repeat_byte(id),
            protocol: "uniswap-v2".to_string(),
            kind: PoolKind::ConstantProduct,
            tokens: smallvec![Token::new(token(t0), DEC), Token::new(token(t1), DEC)],
            reserves: smallvec![U256::from(r0), U256::from(r1)],
            fee_bps: 0,
            amplification: 0,
            concentration: 1,
        };
        store.register_pool(mk(0xA1, 1, 2, 1_000 * UNIT, 1_000 * UNIT), genesis);
        store.register_pool(mk(0xA2, 2, 3, 1_000 * UNIT, 1_000 * UNIT), genesis);
        store.register_pool(mk(0xA3, 3, 1, 1_000 * UNIT, 1_000 * UNIT), genesis);
    }

    /// Reserve shift that skews pool A1 to rate 2 and carries a price tick
    /// for the start token, making the X→Y→Z→X cycle profitable.
    fn skew_event(height: u64) -> InboundEvent {
        InboundEvent::PriceOrReserveUpdate {
            pool_id: Address::repeat_byte(0xA1),
            block: BlockId::new(height, B256::repeat_byte(height as u8)),
            reserves: Some(ReserveUpdate::Absolute(smallvec![
                U256::from(1_000 * UNIT),
                U256::from(2_000 * UNIT)
            ])),
            token_prices: smallvec![(token(1), U256::from(100_000_000u64))],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscription_table() {
        let h = harness(16);
        assert_eq!(
            h.orchestrator.subscribers(EventKind::PriceOrReserveUpdate),
            &[DetectorId::Arbitrage, DetectorId::Liquidation]
        );
        assert_eq!(
            h.orchestrator.subscribers(EventKind::PendingTransactionSeen),
            &[DetectorId::Sandwich]
        );
        assert_eq!(
            h.orchestrator.subscribers(EventKind::PositionChanged),
            &[DetectorId::Liquidation]
        );
        assert!(h.orchestrator.subscribers(EventKind::ReorgNotice).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_produces_candidates_and_replay_is_idempotent() {
        let mut h = harness(16);
        cycle_pools(&h.store);

        h.orchestrator.handle_event(skew_event(2)).await;
        let candidate = h.intake_rx.try_recv().expect("arbitrage candidate");
        assert_eq!(candidate.kind, OpportunityKind::Arbitrage);

        // Replay at the same height: rejected as non-newer, no detection.
        h.orchestrator.handle_event(skew_event(2)).await;
        assert!(h.intake_rx.try_recv().is_err());
        assert_eq!(
            h.metrics.stale_rejects.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_backpressure_drops_are_counted() {
        let mut h = harness(1);
        cycle_pools(&h.store);

        // Fill the single-slot intake so the real candidate cannot fit.
        h.orchestrator.forward(vec![
            Candidate {
                kind: OpportunityKind::Arbitrage,
                protocols: smallvec!["x".to_string()],
                involved: smallvec!["0x01".to_string()],
                gross_profit_usd: 1.0,
                gas_cost_usd: 0.0,
                confidence: 0.9,
                source_block: BlockId::new(1, B256::ZERO),
                snapshot_taken: Instant::now(),
                detected_at: Utc::now(),
            };
            3
        ]);

        assert_eq!(
            h.metrics
                .candidates_dropped
                .load(std::sync::atomic::Ordering::Relaxed),
            2
        );
        // The channel still holds exactly one candidate.
        assert!(h.intake_rx.try_recv().is_ok());
        assert!(h.intake_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reorg_invalidates_emitted_opportunities() {
        let mut h = harness(16);
        cycle_pools(&h.store);

        h.orchestrator.handle_event(skew_event(5)).await;
        let candidate = h.intake_rx.try_recv().expect("candidate");
        assert!(h.scorer.process(candidate).is_some());
        assert_eq!(h.scorer.ranked().len(), 1);

        // Reorg with common ancestor below the source block.
        h.orchestrator
            .handle_event(InboundEvent::ReorgNotice {
                common_ancestor_height: 4,
                common_ancestor_hash: B256::repeat_byte(4),
            })
            .await;

        assert!(h.scorer.ranked().is_empty());
        assert_eq!(h.store.height(), 4);
        assert_eq!(
            h.metrics.reorgs_handled.load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_confirmed_pending_tx_is_evicted() {
        let h = harness(16);

        let tx_id = B256::repeat_byte(0x42);
        h.orchestrator
            .handle_event(InboundEvent::PendingTransactionSeen {
                tx_id,
                sender: Address::repeat_byte(1),
                target: Address::repeat_byte(2),
                swap: mevscan_state::DecodedSwap {
                    token_in: Address::repeat_byte(3),
                    token_out: Address::repeat_byte(4),
                    amount_in: U256::from(1u64),
                    min_amount_out: U256::ZERO,
                },
                gas_price_wei: 1,
                observed_at: Utc::now(),
            })
            .await;
        assert_eq!(h.orchestrator.sandwich.pending_count(), 1);

        h.orchestrator
            .handle_event(InboundEvent::TransactionConfirmed {
                tx_id,
                block_height: 10,
            })
            .await;
        assert_eq!(h.orchestrator.sandwich.pending_count(), 0);
    }
}
