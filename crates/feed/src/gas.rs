//! Gas cost oracle seam.

use parking_lot::RwLock;

/// Gas pricing capability. The real implementation sits on a fee-history
/// feed; detectors only ever ask for a USD cost per gas-unit budget.
pub trait GasOracle: Send + Sync {
    /// Current fast gas price in wei.
    fn gas_price_wei(&self) -> u128;

    /// USD price of the chain's native token.
    fn native_usd(&self) -> f64;

    /// USD cost of burning `gas_units` at the current gas price.
    fn cost_usd(&self, gas_units: u64) -> f64 {
        let wei = self.gas_price_wei().saturating_mul(gas_units as u128);
        wei as f64 / 1e18 * self.native_usd()
    }
}

/// Fixed-rate oracle, updated out of band by the ingestion side.
pub struct StaticGasOracle {
    inner: RwLock<GasQuote>,
}

#[derive(Debug, Clone, Copy)]
struct GasQuote {
    gas_price_wei: u128,
    native_usd: f64,
}

impl StaticGasOracle {
    pub fn new(gas_price_wei: u128, native_usd: f64) -> Self {
        Self {
            inner: RwLock::new(GasQuote {
                gas_price_wei,
                native_usd,
            }),
        }
    }

    /// Replace the quote; called by whatever tracks fee history upstream.
    pub fn update(&self, gas_price_wei: u128, native_usd: f64) {
        *self.inner.write() = GasQuote {
            gas_price_wei,
            native_usd,
        };
    }
}

impl GasOracle for StaticGasOracle {
    fn gas_price_wei(&self) -> u128 {
        self.inner.read().gas_price_wei
    }

    fn native_usd(&self) -> f64 {
        self.inner.read().native_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_usd() {
        // 20 gwei, ETH at $2000: 100k gas = 0.002 ETH = $4.00
        let oracle = StaticGasOracle::new(20_000_000_000, 2_000.0);
        let cost = oracle.cost_usd(100_000);
        assert!((cost - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_takes_effect() {
        let oracle = StaticGasOracle::new(20_000_000_000, 2_000.0);
        oracle.update(40_000_000_000, 2_000.0);
        assert!((oracle.cost_usd(100_000) - 8.0).abs() < 1e-9);
    }
}
