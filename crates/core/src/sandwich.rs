//! Sandwich detection over mempool swaps.
//!
//! For every pending swap with a decoded intent, the detector simulates the
//! attacker's front-run buy, the victim's trade against the shifted
//! reserves, and the closing back-run sell, all through the pool pricing
//! capability. The front-run is capital-capped and shrunk until the victim's
//! slippage floor still holds, since a reverting victim leaves the attacker
//! holding the bag. Confidence is penalized by how competitive the victim's
//! gas price is relative to recent traffic on the same pool.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, B256, U256};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use mevscan_feed::GasOracle;
use mevscan_state::{
    pricing_for, OpportunityKind, PendingTransaction, Pool, Snapshot, SwapLeg,
};

use crate::config::SandwichConfig;
use crate::deadline::Deadline;
use crate::error::DetectError;
use crate::math;
use crate::scorer::Candidate;

/// How many times the front-run is halved before giving up on keeping the
/// victim executable.
const MAX_SHRINK_STEPS: usize = 4;

/// The sandwich detector. Owns the pending-transaction pool; entries are
/// evicted on confirmation or TTL expiry and can never produce candidates
/// afterwards.
pub struct SandwichDetector {
    config: SandwichConfig,
    gas: Arc<dyn GasOracle>,
    pending: DashMap<B256, PendingTransaction>,
    /// Recent gas prices observed per pool, for the competition heuristic.
    gas_seen: DashMap<Address, RwLock<VecDeque<u128>>>,
}

impl SandwichDetector {
    pub fn new(config: SandwichConfig, gas: Arc<dyn GasOracle>) -> Self {
        Self {
            config,
            gas,
            pending: DashMap::new(),
            gas_seen: DashMap::new(),
        }
    }

    /// Track a newly observed pending transaction.
    pub fn observe(&self, tx: PendingTransaction) {
        let history = self.gas_seen.entry(tx.target).or_default();
        {
            let mut history = history.write();
            history.push_back(tx.gas_price_wei);
            while history.len() > self.config.gas_history_depth {
                history.pop_front();
            }
        }
        drop(history);
        self.pending.insert(tx.tx_id, tx);
    }

    /// Evict a confirmed (or dropped) transaction.
    pub fn confirm(&self, tx_id: &B256) {
        if self.pending.remove(tx_id).is_some() {
            trace!(tx = %tx_id, "pending transaction confirmed, evicted");
        }
    }

    /// Drop pending transactions older than the TTL. Returns evicted count.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.pending_ttl();
        let before = self.pending.len();
        self.pending.retain(|_, tx| tx.seen.elapsed() < ttl);
        let evicted = before - self.pending.len();
        if evicted > 0 {
            debug!(evicted, "expired pending transactions evicted");
        }
        evicted
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Evaluate a pending transaction for sandwich profit.
    pub fn detect(
        &self,
        tx_id: &B256,
        snap: &Snapshot,
        deadline: &Deadline,
    ) -> Result<Vec<Candidate>, DetectError> {
        deadline.check()?;

        // Confirmed or expired transactions never produce candidates.
        let Some(tx) = self.pending.get(tx_id).map(|t| t.value().clone()) else {
            return Ok(Vec::new());
        };
        let Some(pool) = snap.pool(&tx.target) else {
            trace!(target = %tx.target, "pending swap targets unknown pool");
            return Ok(Vec::new());
        };

        let (Some(in_idx), Some(out_idx)) = (
            pool.token_index(&tx.swap.token_in),
            pool.token_index(&tx.swap.token_out),
        ) else {
            debug!(tx = %tx_id, pool = %pool.id, "swap tokens not in target pool");
            return Ok(Vec::new());
        };

        let token_in = pool.tokens[in_idx];
        let Some(price_in) = snap.price(&token_in.address) else {
            trace!(token = %token_in.address, "no price for sandwich base token");
            return Ok(Vec::new());
        };

        // Front-run sizing: capital cap, never more than the victim trades.
        let cap = math::usd_to_amount(
            self.config.capital_cap_usd,
            price_in.price,
            token_in.decimals,
        );
        let mut front_in = if cap.is_zero() {
            tx.swap.amount_in
        } else {
            cap.min(tx.swap.amount_in)
        };
        if front_in.is_zero() {
            return Ok(Vec::new());
        }

        let pricing = pricing_for(pool.kind);
        let snapshot_taken = Instant::now();

        for _ in 0..=MAX_SHRINK_STEPS {
            deadline.check()?;

            // Front-run buy.
            let front_leg = SwapLeg {
                token_in_idx: in_idx,
                token_out_idx: out_idx,
                amount_in: front_in,
            };
            let front_out = pricing.quote_output(&pool, front_leg)?;
            let mut shifted: Pool = (*pool).clone();
            shifted.reserves = pricing.post_swap_reserves(&pool, front_leg)?;

            // Victim executes against shifted reserves; their slippage floor
            // must still hold or the whole construction reverts.
            let victim_leg = SwapLeg {
                token_in_idx: in_idx,
                token_out_idx: out_idx,
                amount_in: tx.swap.amount_in,
            };
            let victim_out = pricing.quote_output(&shifted, victim_leg)?;
            if victim_out < tx.swap.min_amount_out {
                front_in = front_in / U256::from(2u64);
                if front_in.is_zero() {
                    return Ok(Vec::new());
                }
                continue;
            }

            let mut after_victim = shifted.clone();
            after_victim.reserves = pricing.post_swap_reserves(&shifted, victim_leg)?;

            // Back-run sell of the front-run inventory.
            let back_leg = SwapLeg {
                token_in_idx: out_idx,
                token_out_idx: in_idx,
                amount_in: front_out,
            };
            let back_out = pricing.quote_output(&after_victim, back_leg)?;

            if back_out <= front_in {
                return Ok(Vec::new());
            }

            let gross_usd = math::calculate_usd_f64(
                back_out - front_in,
                price_in.price,
                token_in.decimals,
            );
            let gas_usd = self.gas.cost_usd(self.config.gas_per_swap * 2);
            let confidence = self.confidence_for(&pool.id, tx.gas_price_wei);

            let involved: SmallVec<[String; 4]> = smallvec![
                tx.tx_id.to_string().to_lowercase(),
                pool.id.to_string().to_lowercase(),
            ];

            return Ok(vec![Candidate {
                kind: OpportunityKind::Sandwich,
                protocols: smallvec![pool.protocol.clone()],
                involved,
                gross_profit_usd: gross_usd,
                gas_cost_usd: gas_usd,
                confidence,
                source_block: snap.block(),
                snapshot_taken,
                detected_at: Utc::now(),
            }]);
        }

        Ok(Vec::new())
    }

    /// Competition heuristic: the victim's gas price rank within recent
    /// observations on the same pool. A victim already bidding above most of
    /// the pool's traffic is likely being chased by other bots.
    fn confidence_for(&self, pool: &Address, victim_gas_wei: u128) -> f64 {
        let rank = self
            .gas_seen
            .get(pool)
            .map(|history| {
                let history = history.read();
                if history.is_empty() {
                    return 0.0;
                }
                let below = history.iter().filter(|g| **g <= victim_gas_wei).count();
                below as f64 / history.len() as f64
            })
            .unwrap_or(0.0);

        (0.9 * (1.0 - self.config.competition_weight * rank)).clamp(0.05, 0.9)
    }
}
