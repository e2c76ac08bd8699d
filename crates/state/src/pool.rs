//! Pool and token entities.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A token, immutable once seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, decimals: u8) -> Self {
        Self { address, decimals }
    }
}

/// AMM curve family of a pool. Pricing is selected polymorphically from this
/// tag; detectors never branch on it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolKind {
    ConstantProduct,
    StableSwap,
    ConcentratedLiquidity,
}

/// An AMM pool. Mutated only by the World State Store on confirmed
/// reserve-changing events; every mutation commits a new version tagged by
/// block height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: Address,
    pub protocol: String,
    pub kind: PoolKind,
    pub tokens: SmallVec<[Token; 2]>,
    pub reserves: SmallVec<[U256; 2]>,
    /// Swap fee in basis points (30 = 0.30%).
    pub fee_bps: u16,
    /// StableSwap amplification coefficient; ignored by other kinds.
    pub amplification: u64,
    /// Concentrated-liquidity virtual-reserve multiplier; ignored by other
    /// kinds. Models liquidity concentrated around the active price range.
    pub concentration: u32,
}

impl Pool {
    /// Index of a token in this pool.
    pub fn token_index(&self, token: &Address) -> Option<usize> {
        self.tokens.iter().position(|t| &t.address == token)
    }

    /// Whether the pool carries both tokens of a pair.
    pub fn has_pair(&self, a: &Address, b: &Address) -> bool {
        self.token_index(a).is_some() && self.token_index(b).is_some()
    }

    /// Fee multiplier applied to input amounts, as (numerator, denominator).
    pub fn fee_factor(&self) -> (U256, U256) {
        (
            U256::from(10_000u64 - self.fee_bps as u64),
            U256::from(10_000u64),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn two_token_pool() -> Pool {
        Pool {
            id: Address::repeat_byte(0xAA),
            protocol: "uniswap-v2".to_string(),
            kind: PoolKind::ConstantProduct,
            tokens: smallvec![
                Token::new(Address::repeat_byte(1), 18),
                Token::new(Address::repeat_byte(2), 6),
            ],
            reserves: smallvec![U256::from(1_000u64), U256::from(2_000u64)],
            fee_bps: 30,
            amplification: 0,
            concentration: 1,
        }
    }

    #[test]
    fn test_token_index() {
        let pool = two_token_pool();
        assert_eq!(pool.token_index(&Address::repeat_byte(1)), Some(0));
        assert_eq!(pool.token_index(&Address::repeat_byte(2)), Some(1));
        assert_eq!(pool.token_index(&Address::repeat_byte(3)), None);
        assert!(pool.has_pair(&Address::repeat_byte(1), &Address::repeat_byte(2)));
    }
}
