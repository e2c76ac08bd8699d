//! Liquidation monitoring over lending positions.
//!
//! A price tick recomputes health factors only for the positions exposed to
//! the moved asset, via the store's reverse index. Cached sensitivities give
//! a fast linear estimate; the full revaluation runs only when the estimate
//! lands near the liquidation threshold or the cached coefficients drifted.
//! Positions already below 1.0 re-emit only on a material change in seizable
//! value, so the scorer is not flooded with identical records every tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, U256};
use chrono::Utc;
use dashmap::DashMap;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace, warn};

use mevscan_feed::GasOracle;
use mevscan_state::{OpportunityKind, Position, PositionId, Snapshot};

use crate::config::LiquidationConfig;
use crate::deadline::Deadline;
use crate::error::DetectError;
use crate::scorer::Candidate;
use crate::sensitivity::PositionSensitivity;

/// Deadline checkpoint granularity while sweeping affected positions.
const POSITION_BATCH: usize = 32;

/// HF band above 1.0 inside which the linear estimate is not trusted and a
/// full revaluation runs.
const NEAR_THRESHOLD_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
struct EmittedLiquidation {
    gross_profit_usd: f64,
}

/// The liquidation monitor.
pub struct LiquidationMonitor {
    config: LiquidationConfig,
    gas: Arc<dyn GasOracle>,
    sensitivities: DashMap<PositionId, PositionSensitivity>,
    last_emitted: DashMap<PositionId, EmittedLiquidation>,
}

impl LiquidationMonitor {
    pub fn new(config: LiquidationConfig, gas: Arc<dyn GasOracle>) -> Self {
        Self {
            config,
            gas,
            sensitivities: DashMap::new(),
            last_emitted: DashMap::new(),
        }
    }

    /// React to oracle price ticks: re-evaluate every position exposed to a
    /// moved asset.
    pub fn detect_price(
        &self,
        changed: &[(Address, U256)],
        snap: &Snapshot,
        deadline: &Deadline,
    ) -> Result<Vec<Candidate>, DetectError> {
        let mut affected_ids: HashSet<PositionId> = HashSet::new();
        let mut affected: Vec<Arc<Position>> = Vec::new();
        for (asset, _) in changed {
            for position in snap.positions_exposed_to(asset) {
                if affected_ids.insert(position.id) {
                    affected.push(position);
                }
            }
        }

        let mut candidates = Vec::new();
        for (index, position) in affected.iter().enumerate() {
            // Checkpoint per position batch.
            if index % POSITION_BATCH == 0 {
                deadline.check()?;
            }
            if let Some(candidate) = self.evaluate(position, changed, snap) {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    /// React to a collateral/debt change on a single position. The change
    /// itself can push the position under water, so it is evaluated
    /// immediately with its sensitivity cache invalidated.
    pub fn on_position_changed(
        &self,
        position_id: &PositionId,
        snap: &Snapshot,
        deadline: &Deadline,
    ) -> Result<Vec<Candidate>, DetectError> {
        deadline.check()?;
        self.sensitivities.remove(position_id);

        let Some(position) = snap.position(position_id) else {
            return Ok(Vec::new());
        };
        Ok(self.evaluate(&position, &[], snap).into_iter().collect())
    }

    /// Forget per-position bookkeeping. Called when a rollback orphans
    /// position state.
    pub fn invalidate_caches(&self) {
        self.sensitivities.clear();
    }

    fn evaluate(
        &self,
        position: &Arc<Position>,
        changed: &[(Address, U256)],
        snap: &Snapshot,
    ) -> Option<Candidate> {
        // Freshness gate: a position is only evaluated against prices within
        // the staleness bound. Max age across exposed assets drives the
        // confidence of anything emitted.
        let staleness_bound = self.config.price_staleness();
        let mut max_age = std::time::Duration::ZERO;
        for asset in position.exposed_assets() {
            let Some(price) = snap.price(&asset) else {
                trace!(position = %position.id, asset = %asset, "missing price, skipping");
                return None;
            };
            max_age = max_age.max(price.age());
        }
        if max_age > staleness_bound {
            debug!(
                position = %position.id,
                age_ms = max_age.as_millis() as u64,
                "prices beyond staleness bound, skipping evaluation"
            );
            return None;
        }

        let price_of = |asset: &Address| snap.price(asset).map(|p| p.price);

        // Fast path: linear estimate from cached sensitivities.
        if !changed.is_empty() {
            if let Some(sens) = self.sensitivities.get(&position.id) {
                if !sens.is_stale(&price_of, self.config.sensitivity_drift_pct) {
                    let estimate = sens.estimate_hf(changed);
                    if estimate >= 1.0 + NEAR_THRESHOLD_MARGIN {
                        // Comfortably safe; a prior emission is stale now.
                        self.last_emitted.remove(&position.id);
                        return None;
                    }
                }
            }
        }

        let hf = position.health_factor(&price_of)?;

        if hf >= 1.0 {
            // Crossing back above the threshold re-arms emission.
            self.last_emitted.remove(&position.id);
            self.refresh_sensitivity(position, &price_of);
            return None;
        }

        if position.is_bad_debt(&price_of, self.config.dust_threshold_usd) {
            trace!(position = %position.id, hf, "bad debt position, not emitting");
            return None;
        }

        let debt_usd = position.debt_usd(&price_of)?;
        let (_, largest_collateral_usd) = position.largest_collateral(&price_of)?;
        let bonus = self.config.bonus_bps as f64 / 10_000.0;

        // Repayable principal is capped by the close factor and by what the
        // seizable collateral can cover including the bonus.
        let repayable = (debt_usd * self.config.close_factor)
            .min(largest_collateral_usd / (1.0 + bonus));
        if repayable <= 0.0 {
            return None;
        }
        let gross = repayable * bonus;

        // Re-emit policy: already-liquidatable positions only re-emit when
        // the seizable value moved materially.
        if let Some(previous) = self.last_emitted.get(&position.id) {
            let reference = previous.gross_profit_usd.max(f64::MIN_POSITIVE);
            let delta_pct = ((gross - previous.gross_profit_usd).abs() / reference) * 100.0;
            if delta_pct < self.config.reemit_delta_pct {
                trace!(position = %position.id, "liquidation unchanged, suppressed at source");
                return None;
            }
        }
        self.last_emitted.insert(
            position.id,
            EmittedLiquidation {
                gross_profit_usd: gross,
            },
        );

        let gas_usd = self.gas.cost_usd(self.config.gas_units);
        let age_fraction =
            max_age.as_secs_f64() / staleness_bound.as_secs_f64().max(f64::MIN_POSITIVE);
        let confidence = (1.0 - age_fraction).clamp(0.05, 0.99);

        warn!(
            position = %position.id,
            hf,
            gross_profit_usd = gross,
            "liquidatable position detected"
        );

        let involved: SmallVec<[String; 4]> =
            smallvec![position.id.to_string().to_lowercase()];
        Some(Candidate {
            kind: OpportunityKind::Liquidation,
            protocols: smallvec![position.protocol.clone()],
            involved,
            gross_profit_usd: gross,
            gas_cost_usd: gas_usd,
            confidence,
            source_block: snap.block(),
            snapshot_taken: Instant::now(),
            detected_at: Utc::now(),
        })
    }

    fn refresh_sensitivity(
        &self,
        position: &Arc<Position>,
        price_of: &impl Fn(&Address) -> Option<U256>,
    ) {
        if let Some(sens) = PositionSensitivity::compute(position, price_of) {
            self.sensitivities.insert(position.id, sens);
        }
    }

    /// Tracked sensitivity count (introspection for stats logging).
    pub fn sensitivity_count(&self) -> usize {
        self.sensitivities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use mevscan_feed::StaticGasOracle;
    use mevscan_state::{
        BlockId, InboundEvent, PositionLegUpdate, WorldStateStore,
    };

    const PRICE_ONE: u64 = 100_000_000;

    fn monitor() -> LiquidationMonitor {
        let config = LiquidationConfig {
            bonus_bps: 500,
            close_factor: 0.5,
            gas_units: 450_000,
            dust_threshold_usd: 0.10,
            reemit_delta_pct: 5.0,
            price_staleness_ms: 60_000,
            sensitivity_drift_pct: 0.5,
        };
        LiquidationMonitor::new(config, Arc::new(StaticGasOracle::new(0, 0.0)))
    }

    fn position_event(collateral_units: u64, lt_bps: u16, debt_units: u64, height: u64) -> InboundEvent {
        InboundEvent::PositionChanged {
            position_id: PositionId(B256::repeat_byte(7)),
            owner: Address::repeat_byte(9),
            protocol: "aave-v3".to_string(),
            collateral: smallvec![PositionLegUpdate {
                asset: Address::repeat_byte(0xC0),
                amount: U256::from(collateral_units) * U256::from(1_000_000u64),
                decimals: 6,
                liquidation_threshold_bps: lt_bps,
            }],
            debt: smallvec![PositionLegUpdate {
                asset: Address::repeat_byte(0xD0),
                amount: U256::from(debt_units) * U256::from(1_000_000u64),
                decimals: 6,
                liquidation_threshold_bps: 0,
            }],
            block: BlockId::new(height, B256::repeat_byte(height as u8)),
        }
    }

    fn price_event(height: u64) -> InboundEvent {
        InboundEvent::PriceOrReserveUpdate {
            pool_id: Address::ZERO,
            block: BlockId::new(height, B256::repeat_byte(height as u8)),
            reserves: None,
            token_prices: smallvec![
                (Address::repeat_byte(0xC0), U256::from(PRICE_ONE)),
                (Address::repeat_byte(0xD0), U256::from(PRICE_ONE)),
            ],
            timestamp: Utc::now(),
        }
    }

    fn store_with(events: &[InboundEvent]) -> Arc<WorldStateStore> {
        let store = Arc::new(WorldStateStore::new());
        for event in events {
            store.apply_update(event).unwrap();
        }
        store
    }

    #[test]
    fn test_healthy_position_not_emitted() {
        // Collateral 150 at threshold 0.8, debt 100: HF = 1.2
        let store = store_with(&[price_event(1), position_event(150, 8_000, 100, 2)]);
        let monitor = monitor();

        let candidates = monitor
            .on_position_changed(
                &PositionId(B256::repeat_byte(7)),
                &store.snapshot(),
                &Deadline::unbounded(),
            )
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_underwater_position_emitted_exactly_once() {
        let store = store_with(&[price_event(1), position_event(150, 8_000, 100, 2)]);
        let monitor = monitor();
        let id = PositionId(B256::repeat_byte(7));

        // HF 1.2: nothing.
        let snap = store.snapshot();
        assert!(monitor
            .on_position_changed(&id, &snap, &Deadline::unbounded())
            .unwrap()
            .is_empty());

        // Collateral drops to 100: HF = 0.8, one candidate.
        store.apply_update(&position_event(100, 8_000, 100, 3)).unwrap();
        let snap = store.snapshot();
        let candidates = monitor
            .on_position_changed(&id, &snap, &Deadline::unbounded())
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, OpportunityKind::Liquidation);

        // Bonus on repayable 50 (close factor 0.5 of 100 debt) at 5%.
        let expected_gross = 50.0 * 0.05;
        assert!((candidates[0].gross_profit_usd - expected_gross).abs() < 0.2);

        // Same state re-evaluated (e.g. the price ticks again): suppressed.
        let repeat = monitor
            .detect_price(
                &[(Address::repeat_byte(0xC0), U256::from(PRICE_ONE))],
                &snap,
                &Deadline::unbounded(),
            )
            .unwrap();
        assert!(repeat.is_empty());
    }

    #[test]
    fn test_material_change_reemits() {
        let store = store_with(&[price_event(1), position_event(100, 8_000, 100, 2)]);
        let monitor = monitor();
        let id = PositionId(B256::repeat_byte(7));

        let first = monitor
            .on_position_changed(&id, &store.snapshot(), &Deadline::unbounded())
            .unwrap();
        assert_eq!(first.len(), 1);

        // Debt doubles: repayable doubles, well past the 5% re-emit delta.
        store.apply_update(&position_event(100, 8_000, 200, 3)).unwrap();
        let second = monitor
            .on_position_changed(&id, &store.snapshot(), &Deadline::unbounded())
            .unwrap();
        assert_eq!(second.len(), 1);
        assert!(second[0].gross_profit_usd > first[0].gross_profit_usd);
    }

    #[test]
    fn test_recovered_position_rearms_emission() {
        let store = store_with(&[price_event(1), position_event(100, 8_000, 100, 2)]);
        let monitor = monitor();
        let id = PositionId(B256::repeat_byte(7));

        assert_eq!(
            monitor
                .on_position_changed(&id, &store.snapshot(), &Deadline::unbounded())
                .unwrap()
                .len(),
            1
        );

        // Collateral restored: HF back above 1.0.
        store.apply_update(&position_event(150, 8_000, 100, 3)).unwrap();
        assert!(monitor
            .on_position_changed(&id, &store.snapshot(), &Deadline::unbounded())
            .unwrap()
            .is_empty());

        // Under water again: emits again.
        store.apply_update(&position_event(100, 8_000, 100, 4)).unwrap();
        assert_eq!(
            monitor
                .on_position_changed(&id, &store.snapshot(), &Deadline::unbounded())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_dust_position_skipped() {
        // 0.05 USD collateral: below the 0.10 dust threshold.
        let store = store_with(&[price_event(1)]);
        let event = InboundEvent::PositionChanged {
            position_id: PositionId(B256::repeat_byte(7)),
            owner: Address::repeat_byte(9),
            protocol: "aave-v3".to_string(),
            collateral: smallvec![PositionLegUpdate {
                asset: Address::repeat_byte(0xC0),
                amount: U256::from(50_000u64),
                decimals: 6,
                liquidation_threshold_bps: 8_000,
            }],
            debt: smallvec![PositionLegUpdate {
                asset: Address::repeat_byte(0xD0),
                amount: U256::from(1_000_000u64),
                decimals: 6,
                liquidation_threshold_bps: 0,
            }],
            block: BlockId::new(2, B256::repeat_byte(2)),
        };
        store.apply_update(&event).unwrap();

        let monitor = monitor();
        let candidates = monitor
            .on_position_changed(
                &PositionId(B256::repeat_byte(7)),
                &store.snapshot(),
                &Deadline::unbounded(),
            )
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_price_move_triggers_via_exposure_index() {
        let store = store_with(&[price_event(1), position_event(120, 8_000, 100, 2)]);
        let monitor = monitor();

        // Collateral price drops 20%: HF = 120·0.8·0.8/100 = 0.768.
        let drop = InboundEvent::PriceOrReserveUpdate {
            pool_id: Address::ZERO,
            block: BlockId::new(3, B256::repeat_byte(3)),
            reserves: None,
            token_prices: smallvec![(Address::repeat_byte(0xC0), U256::from(80_000_000u64))],
            timestamp: Utc::now(),
        };
        store.apply_update(&drop).unwrap();

        let candidates = monitor
            .detect_price(
                &[(Address::repeat_byte(0xC0), U256::from(80_000_000u64))],
                &store.snapshot(),
                &Deadline::unbounded(),
            )
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }
}
