//! AMM pricing capability.
//!
//! Detectors price trades only through the [`PoolPricing`] trait; the concrete
//! curve math is selected from the pool's [`PoolKind`]. All quotes are exact
//! for constant-product pools and close approximations for the other kinds,
//! which is sufficient for candidate screening (execution is out of scope).

use alloy::primitives::U256;
use smallvec::SmallVec;

use crate::error::StateError;
use crate::pool::{Pool, PoolKind};

/// One leg of a simulated swap against a pool.
#[derive(Debug, Clone, Copy)]
pub struct SwapLeg {
    pub token_in_idx: usize,
    pub token_out_idx: usize,
    pub amount_in: U256,
}

/// Pricing capability implemented per AMM curve family.
pub trait PoolPricing: Send + Sync {
    /// Output amount for `amount_in`, after fees and slippage.
    fn quote_output(&self, pool: &Pool, leg: SwapLeg) -> Result<U256, StateError>;

    /// Fraction by which the execution price is worse than the spot price,
    /// in `0.0..1.0`.
    fn price_impact(&self, pool: &Pool, leg: SwapLeg) -> Result<f64, StateError> {
        let out = self.quote_output(pool, leg)?;
        let r_in = reserve(pool, leg.token_in_idx)?;
        let r_out = reserve(pool, leg.token_out_idx)?;

        // Spot output ignores slippage and fees.
        let spot = mul_div(leg.amount_in, r_out, r_in)?;
        if spot.is_zero() {
            return Ok(0.0);
        }
        let exec = u256_f64(out);
        let ideal = u256_f64(spot);
        Ok((1.0 - exec / ideal).clamp(0.0, 1.0))
    }

    /// Reserves after executing the leg. Used by sandwich simulation, which
    /// must price the victim's trade against attacker-shifted reserves.
    fn post_swap_reserves(
        &self,
        pool: &Pool,
        leg: SwapLeg,
    ) -> Result<SmallVec<[U256; 2]>, StateError> {
        let out = self.quote_output(pool, leg)?;
        let mut reserves = pool.reserves.clone();
        reserves[leg.token_in_idx] = reserves[leg.token_in_idx].saturating_add(leg.amount_in);
        reserves[leg.token_out_idx] = reserves[leg.token_out_idx].saturating_sub(out);
        Ok(reserves)
    }
}

/// Select the pricing implementation for a pool kind.
pub fn pricing_for(kind: PoolKind) -> &'static dyn PoolPricing {
    match kind {
        PoolKind::ConstantProduct => &ConstantProduct,
        PoolKind::StableSwap => &StableSwap,
        PoolKind::ConcentratedLiquidity => &ConcentratedLiquidity,
    }
}

/// x·y=k with fee taken on input (Uniswap V2 family).
struct ConstantProduct;

impl PoolPricing for ConstantProduct {
    fn quote_output(&self, pool: &Pool, leg: SwapLeg) -> Result<U256, StateError> {
        let r_in = reserve(pool, leg.token_in_idx)?;
        let r_out = reserve(pool, leg.token_out_idx)?;
        constant_product_out(pool, r_in, r_out, leg.amount_in)
    }
}

/// Flat-curve pool with amplification (Curve family). Solved by Newton
/// iteration on the two-token invariant; converges in a handful of rounds.
struct StableSwap;

impl PoolPricing for StableSwap {
    fn quote_output(&self, pool: &Pool, leg: SwapLeg) -> Result<U256, StateError> {
        let r_in = reserve(pool, leg.token_in_idx)?;
        let r_out = reserve(pool, leg.token_out_idx)?;

        let (fee_num, fee_den) = pool.fee_factor();
        let amount_in = mul_div(leg.amount_in, fee_num, fee_den)?;

        let amp = pool.amplification.max(1);
        let d = stable_d(r_in, r_out, amp);
        let x = r_in.saturating_add(amount_in);
        let y = stable_y(x, d, amp);

        let out = r_out.saturating_sub(y);
        if out >= r_out {
            return Err(StateError::ZeroReserve { pool: pool.id });
        }
        Ok(out)
    }
}

/// Liquidity concentrated around the active range, approximated as a
/// constant-product curve over virtual reserves. Output is capped at the
/// real reserve so the pool can never be drained past its actual depth.
struct ConcentratedLiquidity;

impl PoolPricing for ConcentratedLiquidity {
    fn quote_output(&self, pool: &Pool, leg: SwapLeg) -> Result<U256, StateError> {
        let r_in = reserve(pool, leg.token_in_idx)?;
        let r_out = reserve(pool, leg.token_out_idx)?;

        let factor = U256::from(pool.concentration.max(1));
        let out = constant_product_out(
            pool,
            r_in.saturating_mul(factor),
            r_out.saturating_mul(factor),
            leg.amount_in,
        )?;

        // Real depth bounds the fill.
        Ok(if out > r_out { r_out } else { out })
    }
}

// Shared curve math

fn constant_product_out(
    pool: &Pool,
    r_in: U256,
    r_out: U256,
    amount_in: U256,
) -> Result<U256, StateError> {
    let (fee_num, fee_den) = pool.fee_factor();
    let in_with_fee = amount_in.saturating_mul(fee_num);
    let numerator = in_with_fee.saturating_mul(r_out);
    let denominator = r_in.saturating_mul(fee_den).saturating_add(in_with_fee);
    if denominator.is_zero() {
        return Err(StateError::ZeroReserve { pool: pool.id });
    }
    Ok(numerator / denominator)
}

/// Invariant D for a two-token stable pool, by Newton iteration.
fn stable_d(x: U256, y: U256, amp: u64) -> U256 {
    let n = U256::from(2u64);
    let s = x.saturating_add(y);
    if s.is_zero() {
        return U256::ZERO;
    }
    let ann = U256::from(amp) * n;

    let mut d = s;
    for _ in 0..64 {
        // d_p = d^3 / (4·x·y)
        let mut d_p = d;
        d_p = mul_div_floor(d_p, d, x.saturating_mul(n));
        d_p = mul_div_floor(d_p, d, y.saturating_mul(n));

        let d_prev = d;
        let numerator = (ann.saturating_mul(s) + d_p.saturating_mul(n)).saturating_mul(d);
        let denominator = (ann.saturating_sub(U256::from(1u64)))
            .saturating_mul(d)
            .saturating_add(d_p.saturating_mul(n + U256::from(1u64)));
        if denominator.is_zero() {
            return d;
        }
        d = numerator / denominator;

        if abs_diff(d, d_prev) <= U256::from(1u64) {
            break;
        }
    }
    d
}

/// Solve for the output-side balance y given the input-side balance x and
/// invariant D.
fn stable_y(x: U256, d: U256, amp: u64) -> U256 {
    let n = U256::from(2u64);
    let ann = U256::from(amp) * n;
    if x.is_zero() || d.is_zero() || ann.is_zero() {
        return U256::ZERO;
    }

    // c = d^3 / (4·x·ann), b = x + d/ann
    let mut c = mul_div_floor(d, d, x.saturating_mul(n));
    c = mul_div_floor(c, d, ann.saturating_mul(n));
    let b = x.saturating_add(d / ann);

    let mut y = d;
    for _ in 0..64 {
        let y_prev = y;
        let numerator = y.saturating_mul(y).saturating_add(c);
        let denominator = (y.saturating_mul(U256::from(2u64)).saturating_add(b)).saturating_sub(d);
        if denominator.is_zero() {
            return y;
        }
        y = numerator / denominator;
        if abs_diff(y, y_prev) <= U256::from(1u64) {
            break;
        }
    }
    y
}

fn reserve(pool: &Pool, idx: usize) -> Result<U256, StateError> {
    let r = pool
        .reserves
        .get(idx)
        .copied()
        .ok_or_else(|| StateError::DecodeInconsistency(format!("reserve index {idx}")))?;
    if r.is_zero() {
        return Err(StateError::ZeroReserve { pool: pool.id });
    }
    Ok(r)
}

fn mul_div(a: U256, b: U256, den: U256) -> Result<U256, StateError> {
    if den.is_zero() {
        return Err(StateError::DecodeInconsistency("division by zero".into()));
    }
    Ok(a.saturating_mul(b) / den)
}

fn mul_div_floor(a: U256, b: U256, den: U256) -> U256 {
    if den.is_zero() {
        return U256::ZERO;
    }
    a.saturating_mul(b) / den
}

fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

fn u256_f64(v: U256) -> f64 {
    if v <= U256::from(u128::MAX) {
        v.to::<u128>() as f64
    } else {
        let limbs = v.as_limbs();
        let mut out = 0.0f64;
        for (i, limb) in limbs.iter().enumerate() {
            out += *limb as f64 * 2f64.powi(64 * i as i32);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use crate::pool::Token;
    use smallvec::smallvec;

    fn pool(kind: PoolKind, r0: u128, r1: u128, fee_bps: u16) -> Pool {
        Pool {
            id: Address::repeat_byte(0xAB),
            protocol: "test-dex".to_string(),
            kind,
            tokens: smallvec![
                Token::new(Address::repeat_byte(1), 18),
                Token::new(Address::repeat_byte(2), 18),
            ],
            reserves: smallvec![U256::from(r0), U256::from(r1)],
            fee_bps,
            amplification: 100,
            concentration: 10,
        }
    }

    fn leg(amount_in: u128) -> SwapLeg {
        SwapLeg {
            token_in_idx: 0,
            token_out_idx: 1,
            amount_in: U256::from(amount_in),
        }
    }

    #[test]
    fn test_constant_product_quote() {
        let p = pool(PoolKind::ConstantProduct, 1_000_000, 1_000_000, 0);
        let pricing = pricing_for(p.kind);

        // No fee: out = in·r_out / (r_in + in) = 1000·1e6/(1e6+1000)
        let out = pricing.quote_output(&p, leg(1_000)).unwrap();
        assert_eq!(out, U256::from(999u64));
    }

    #[test]
    fn test_constant_product_fee_reduces_output() {
        let no_fee = pool(PoolKind::ConstantProduct, 1_000_000, 1_000_000, 0);
        let with_fee = pool(PoolKind::ConstantProduct, 1_000_000, 1_000_000, 30);
        let pricing = pricing_for(PoolKind::ConstantProduct);

        let a = pricing.quote_output(&no_fee, leg(10_000)).unwrap();
        let b = pricing.quote_output(&with_fee, leg(10_000)).unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_price_impact_grows_with_size() {
        let p = pool(PoolKind::ConstantProduct, 1_000_000, 1_000_000, 30);
        let pricing = pricing_for(p.kind);

        let small = pricing.price_impact(&p, leg(1_000)).unwrap();
        let large = pricing.price_impact(&p, leg(200_000)).unwrap();
        assert!(large > small);
        assert!(large < 1.0);
    }

    #[test]
    fn test_stable_swap_flatter_than_constant_product() {
        let cp = pool(PoolKind::ConstantProduct, 1_000_000, 1_000_000, 0);
        let ss = pool(PoolKind::StableSwap, 1_000_000, 1_000_000, 0);

        let trade = leg(100_000);
        let cp_out = pricing_for(cp.kind).quote_output(&cp, trade).unwrap();
        let ss_out = pricing_for(ss.kind).quote_output(&ss, trade).unwrap();

        // The flat curve fills a large trade closer to 1:1.
        assert!(ss_out > cp_out);
        assert!(ss_out <= U256::from(100_000u64));
    }

    #[test]
    fn test_concentrated_liquidity_caps_at_real_reserve() {
        let p = pool(PoolKind::ConcentratedLiquidity, 1_000, 1_000, 0);
        let pricing = pricing_for(p.kind);

        // Virtual reserves would quote more than the pool holds.
        let out = pricing.quote_output(&p, leg(1_000_000)).unwrap();
        assert!(out <= U256::from(1_000u64));
    }

    #[test]
    fn test_zero_reserve_is_a_fault_not_a_panic() {
        let mut p = pool(PoolKind::ConstantProduct, 1_000, 1_000, 0);
        p.reserves[0] = U256::ZERO;
        let err = pricing_for(p.kind).quote_output(&p, leg(10)).unwrap_err();
        assert!(matches!(err, StateError::ZeroReserve { .. }));
    }

    #[test]
    fn test_post_swap_reserves_conserve_direction() {
        let p = pool(PoolKind::ConstantProduct, 1_000_000, 1_000_000, 30);
        let pricing = pricing_for(p.kind);
        let after = pricing.post_swap_reserves(&p, leg(50_000)).unwrap();

        assert!(after[0] > p.reserves[0]);
        assert!(after[1] < p.reserves[1]);
    }
}
