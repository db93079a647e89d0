//! Gas limit buffering and worst-case cost for contract writes

use ethers::types::U256;

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
        }
    }

    #[cfg(test)]
    fn with_buffer_percent(gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
        }
    }

    /// Buffered gas limit for an estimate
    pub fn buffered_limit(&self, estimate: U256) -> U256 {
        let buffer = estimate * self.gas_limit_buffer_percent / 100;
        estimate.saturating_add(buffer)
    }

    /// Calculate total cost in wei, including any payable value
    pub fn calculate_cost(gas_limit: U256, gas_price: U256, value: U256) -> U256 {
        gas_limit.saturating_mul(gas_price).saturating_add(value)
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_limit() {
        let estimator = GasEstimator::new();
        assert_eq!(estimator.buffered_limit(U256::from(100_000)), U256::from(120_000));
        assert_eq!(
            GasEstimator::with_buffer_percent(0).buffered_limit(U256::from(21_000)),
            U256::from(21_000)
        );
    }

    #[test]
    fn test_cost_includes_value() {
        let cost = GasEstimator::calculate_cost(
            U256::from(120_000),
            U256::from(25_000_000_000u64),
            U256::from(1_000u64),
        );
        assert_eq!(cost, U256::from(3_000_000_000_001_000u64));
    }
}
