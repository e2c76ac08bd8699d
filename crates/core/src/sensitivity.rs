//! Health factor sensitivity estimation for fast HF approximation.
//!
//! Uses linear approximation to estimate HF changes from price movements
//! without revaluing the whole position on every tick. A full recompute
//! happens when prices drift past a bound or the estimate lands near the
//! liquidation threshold.

use alloy::primitives::{Address, U256};
use smallvec::SmallVec;
use std::time::Instant;

use crate::math;
use mevscan_state::{Position, PositionId};

/// Pre-computed sensitivity coefficients for fast HF estimation.
#[derive(Debug, Clone)]
pub struct PositionSensitivity {
    /// Position this was computed for
    pub position: PositionId,
    /// Base health factor at computation time
    pub base_hf: f64,
    /// dHF/d(%price) for each exposed asset
    pub sensitivities: SmallVec<[(Address, f64); 8]>,
    /// Price snapshot when computed (for drift detection)
    pub price_snapshot: SmallVec<[(Address, U256); 8]>,
    /// When sensitivities were computed
    pub computed_at: Instant,
}

impl PositionSensitivity {
    /// Compute sensitivities from a position and current prices.
    /// `None` when a needed price is missing or the position has no debt.
    pub fn compute(
        position: &Position,
        price_of: &impl Fn(&Address) -> Option<U256>,
    ) -> Option<Self> {
        let base_hf = position.health_factor(price_of)?;
        let total_debt = position.debt_usd(price_of)?;
        if total_debt <= 0.0 || !base_hf.is_finite() {
            return None;
        }

        let mut sensitivities: SmallVec<[(Address, f64); 8]> = SmallVec::new();
        let mut price_snapshot: SmallVec<[(Address, U256); 8]> = SmallVec::new();

        // Collateral sensitivity: dHF/d(%price) = (value × LT) / total_debt / 100.
        // A 1% collateral price move shifts HF by this amount.
        for leg in &position.collaterals {
            let price = price_of(&leg.asset)?;
            let value = math::calculate_usd_f64(leg.amount, price, leg.decimals);
            let sensitivity = value * leg.lt_decimal() / total_debt / 100.0;

            if let Some(existing) = sensitivities.iter_mut().find(|(a, _)| a == &leg.asset) {
                existing.1 += sensitivity;
            } else {
                sensitivities.push((leg.asset, sensitivity));
                price_snapshot.push((leg.asset, price));
            }
        }

        // Debt sensitivity: dHF/d(%price) = -HF × debt_value / total_debt / 100.
        for leg in &position.debts {
            let price = price_of(&leg.asset)?;
            let value = math::calculate_usd_f64(leg.amount, price, leg.decimals);
            let sensitivity = -base_hf * value / total_debt / 100.0;

            if let Some(existing) = sensitivities.iter_mut().find(|(a, _)| a == &leg.asset) {
                existing.1 += sensitivity;
            } else {
                sensitivities.push((leg.asset, sensitivity));
                price_snapshot.push((leg.asset, price));
            }
        }

        Some(Self {
            position: position.id,
            base_hf,
            sensitivities,
            price_snapshot,
            computed_at: Instant::now(),
        })
    }

    /// Estimate HF from new absolute prices using linear approximation.
    pub fn estimate_hf(&self, new_prices: &[(Address, U256)]) -> f64 {
        let mut hf = self.base_hf;

        for (asset, new_price) in new_prices {
            let Some((_, sensitivity)) = self.sensitivities.iter().find(|(a, _)| a == asset)
            else {
                continue;
            };
            let Some((_, old_price)) = self.price_snapshot.iter().find(|(a, _)| a == asset)
            else {
                continue;
            };
            if old_price.is_zero() {
                continue;
            }

            let pct_change = math::pct_diff_bps(*old_price, *new_price) as f64 / 100.0;
            hf += sensitivity * pct_change;
        }

        hf
    }

    /// Whether prices drifted past `threshold_pct` since computation.
    pub fn is_stale(
        &self,
        price_of: &impl Fn(&Address) -> Option<U256>,
        threshold_pct: f64,
    ) -> bool {
        let threshold_bps = (threshold_pct * 100.0) as i64;

        for (asset, old_price) in &self.price_snapshot {
            if old_price.is_zero() {
                continue;
            }
            if let Some(current) = price_of(asset) {
                if math::pct_diff_bps(*old_price, current).abs() > threshold_bps {
                    return true;
                }
            }
        }
        false
    }

    /// Age of the sensitivity computation.
    pub fn age(&self) -> std::time::Duration {
        self.computed_at.elapsed()
    }
}
