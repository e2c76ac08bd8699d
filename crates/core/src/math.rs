//! Native U256 arithmetic for the detection hot paths.
//!
//! Avoids String round-trips (U256 -> String -> f64) when converting raw
//! chain amounts into USD terms for scoring.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Oracle price decimals (8)
pub const PRICE_DECIMALS: u8 = 8;

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38)
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Apply basis points reduction (e.g., for slippage).
/// Returns: value * (10000 - basis_points) / 10000
#[inline(always)]
pub fn apply_basis_points(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10_000u16.saturating_sub(basis_points));
    (value * factor) / BPS_DENOMINATOR
}

/// Calculate USD value from token amount and 8-decimal oracle price,
/// in 18-decimal WAD format.
///
/// Formula: (amount * price * 10^18) / (10^decimals * 10^8)
#[inline(always)]
pub fn calculate_usd_wad(amount: U256, price: U256, decimals: u8) -> U256 {
    if amount.is_zero() || price.is_zero() {
        return U256::ZERO;
    }

    let target_decimals = 18i32;
    let scale_adjustment = target_decimals - decimals as i32 - PRICE_DECIMALS as i32;

    if scale_adjustment >= 0 {
        amount * price * pow10(scale_adjustment as u8)
    } else {
        (amount * price) / pow10((-scale_adjustment) as u8)
    }
}

/// Calculate USD value as f64 (for scoring and logging).
#[inline(always)]
pub fn calculate_usd_f64(amount: U256, price: U256, decimals: u8) -> f64 {
    wad_to_f64(calculate_usd_wad(amount, price, decimals))
}

/// Convert WAD (18 decimals) to f64.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Raw token amount for a USD value at an 8-decimal oracle price.
/// Inverse of [`calculate_usd_f64`]; used to size probe and front-run capital.
#[inline(always)]
pub fn usd_to_amount(usd: f64, price: U256, decimals: u8) -> U256 {
    if usd <= 0.0 || price.is_zero() {
        return U256::ZERO;
    }
    let price_f = if price <= U256::from(u128::MAX) {
        price.to::<u128>() as f64 / 1e8
    } else {
        return U256::ZERO;
    };
    let tokens = usd / price_f;
    let raw = tokens * 10f64.powi(decimals as i32);
    if raw.is_finite() && raw >= 0.0 && raw < 3.4e38 {
        U256::from(raw as u128)
    } else {
        U256::ZERO
    }
}

/// Calculate percentage difference in basis points.
/// Returns: ((new - old) * 10000) / old
#[inline(always)]
pub fn pct_diff_bps(old: U256, new: U256) -> i64 {
    if old.is_zero() {
        return 0;
    }

    if new >= old {
        let diff = new - old;
        let bps = (diff * BPS_DENOMINATOR) / old;
        bps.to::<i64>()
    } else {
        let diff = old - new;
        let bps = (diff * BPS_DENOMINATOR) / old;
        -(bps.to::<i64>())
    }
}

/// Convert a raw token amount to f64 token units (lossy, scoring only).
#[inline(always)]
pub fn amount_to_f64(amount: U256, decimals: u8) -> f64 {
    if amount <= U256::from(u128::MAX) {
        amount.to::<u128>() as f64 / 10f64.powi(decimals as i32)
    } else {
        f64::MAX
    }
}
