//! Lending position entity and health factor math.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Stable identifier of a position across updates. Assigned by the upstream
/// decoder (typically a hash of owner + protocol + market).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub B256);

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collateral leg of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralLeg {
    pub asset: Address,
    /// Raw balance in token decimals.
    pub amount: U256,
    pub decimals: u8,
    /// Liquidation threshold in basis points (8000 = 80%).
    pub liquidation_threshold_bps: u16,
}

impl CollateralLeg {
    /// Threshold as a decimal fraction.
    pub fn lt_decimal(&self) -> f64 {
        self.liquidation_threshold_bps as f64 / 10_000.0
    }
}

/// Debt leg of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtLeg {
    pub asset: Address,
    pub amount: U256,
    pub decimals: u8,
}

/// A collateralized debt position.
///
/// Versioned by the World State Store; health factor is computed on demand
/// against a price snapshot rather than stored, so a stale valuation can
/// never be read back as fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: Address,
    pub protocol: String,
    pub collaterals: SmallVec<[CollateralLeg; 4]>,
    pub debts: SmallVec<[DebtLeg; 4]>,
}

impl Position {
    /// All assets this position is exposed to, collateral and debt sides.
    pub fn exposed_assets(&self) -> SmallVec<[Address; 8]> {
        let mut assets: SmallVec<[Address; 8]> = SmallVec::new();
        for leg in &self.collaterals {
            if !assets.contains(&leg.asset) {
                assets.push(leg.asset);
            }
        }
        for leg in &self.debts {
            if !assets.contains(&leg.asset) {
                assets.push(leg.asset);
            }
        }
        assets
    }

    /// Total collateral value in USD under the given price view.
    /// Returns `None` when a needed price is missing.
    pub fn collateral_usd(&self, price_of: &impl Fn(&Address) -> Option<U256>) -> Option<f64> {
        let mut total = 0.0;
        for leg in &self.collaterals {
            let price = price_of(&leg.asset)?;
            total += usd_value(leg.amount, price, leg.decimals);
        }
        Some(total)
    }

    /// Total debt value in USD under the given price view.
    pub fn debt_usd(&self, price_of: &impl Fn(&Address) -> Option<U256>) -> Option<f64> {
        let mut total = 0.0;
        for leg in &self.debts {
            let price = price_of(&leg.asset)?;
            total += usd_value(leg.amount, price, leg.decimals);
        }
        Some(total)
    }

    /// Health factor: Σ(collateral value × liquidation threshold) / Σ(debt).
    ///
    /// `f64::INFINITY` for debt-free positions; `None` when a price is
    /// missing (callers must treat that as "cannot evaluate", not "safe").
    pub fn health_factor(&self, price_of: &impl Fn(&Address) -> Option<U256>) -> Option<f64> {
        let mut adjusted_collateral = 0.0;
        for leg in &self.collaterals {
            let price = price_of(&leg.asset)?;
            adjusted_collateral += usd_value(leg.amount, price, leg.decimals) * leg.lt_decimal();
        }

        let debt = self.debt_usd(price_of)?;
        if debt == 0.0 {
            return Some(f64::INFINITY);
        }
        Some(adjusted_collateral / debt)
    }

    /// Largest collateral leg by USD value.
    pub fn largest_collateral(
        &self,
        price_of: &impl Fn(&Address) -> Option<U256>,
    ) -> Option<(&CollateralLeg, f64)> {
        self.collaterals
            .iter()
            .filter_map(|leg| {
                let price = price_of(&leg.asset)?;
                Some((leg, usd_value(leg.amount, price, leg.decimals)))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Largest debt leg by USD value.
    pub fn largest_debt(
        &self,
        price_of: &impl Fn(&Address) -> Option<U256>,
    ) -> Option<(&DebtLeg, f64)> {
        self.debts
            .iter()
            .filter_map(|leg| {
                let price = price_of(&leg.asset)?;
                Some((leg, usd_value(leg.amount, price, leg.decimals)))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Positions that can never be liquidated profitably: dust collateral,
    /// or the seizable collateral is the same token as the largest debt
    /// (nothing to swap the seizure into).
    pub fn is_bad_debt(
        &self,
        price_of: &impl Fn(&Address) -> Option<U256>,
        dust_threshold_usd: f64,
    ) -> bool {
        let Some(collateral) = self.collateral_usd(price_of) else {
            return false;
        };
        if collateral < dust_threshold_usd {
            return true;
        }

        if let (Some((col, _)), Some((debt, _))) =
            (self.largest_collateral(price_of), self.largest_debt(price_of))
        {
            if col.asset == debt.asset {
                return true;
            }
        }
        false
    }
}

/// USD value of a raw token amount at an 8-decimal oracle price.
pub(crate) fn usd_value(amount: U256, price: U256, decimals: u8) -> f64 {
    if amount.is_zero() || price.is_zero() {
        return 0.0;
    }
    let amount_f = if amount <= U256::from(u128::MAX) {
        amount.to::<u128>() as f64
    } else {
        f64::MAX
    };
    let price_f = if price <= U256::from(u128::MAX) {
        price.to::<u128>() as f64
    } else {
        f64::MAX
    };
    amount_f / 10f64.powi(decimals as i32) * (price_f / 1e8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    const PRICE_ONE_USD: u64 = 100_000_000;

    fn flat_price(_: &Address) -> Option<U256> {
        Some(U256::from(PRICE_ONE_USD))
    }

    fn position(collateral: u64, lt_bps: u16, debt: u64) -> Position {
        Position {
            id: PositionId(B256::repeat_byte(1)),
            owner: Address::repeat_byte(1),
            protocol: "aave-v3".to_string(),
            collaterals: smallvec![CollateralLeg {
                asset: Address::repeat_byte(0xC0),
                amount: U256::from(collateral) * U256::from(1_000_000u64),
                decimals: 6,
                liquidation_threshold_bps: lt_bps,
            }],
            debts: smallvec![DebtLeg {
                asset: Address::repeat_byte(0xD0),
                amount: U256::from(debt) * U256::from(1_000_000u64),
                decimals: 6,
            }],
        }
    }

    #[test]
    fn test_health_factor_worked_example() {
        // Collateral 150, threshold 0.8, debt 100: HF = 150·0.8/100 = 1.2
        let pos = position(150, 8_000, 100);
        let hf = pos.health_factor(&flat_price).unwrap();
        assert!((hf - 1.2).abs() < 1e-9);

        // Collateral reduced to 100: HF = 0.8, liquidatable
        let pos = position(100, 8_000, 100);
        let hf = pos.health_factor(&flat_price).unwrap();
        assert!((hf - 0.8).abs() < 1e-9);
        assert!(hf < 1.0);
    }

    #[test]
    fn test_debt_free_position_is_infinite() {
        let mut pos = position(150, 8_000, 100);
        pos.debts.clear();
        assert_eq!(pos.health_factor(&flat_price), Some(f64::INFINITY));
    }

    #[test]
    fn test_missing_price_cannot_evaluate() {
        let pos = position(150, 8_000, 100);
        let no_price = |_: &Address| -> Option<U256> { None };
        assert_eq!(pos.health_factor(&no_price), None);
    }

    #[test]
    fn test_bad_debt_same_asset() {
        let mut pos = position(150, 8_000, 100);
        pos.debts[0].asset = pos.collaterals[0].asset;
        assert!(pos.is_bad_debt(&flat_price, 0.10));
    }

    #[test]
    fn test_usd_value() {
        // 1000 tokens, 6 decimals, $1.00
        let v = usd_value(
            U256::from(1_000_000_000u64),
            U256::from(PRICE_ONE_USD),
            6,
        );
        assert!((v - 1000.0).abs() < 1e-6);
    }
}
