//! Phase0 reward arithmetic.

use ember_consensus_misc::{constants::BASE_REWARDS_PER_EPOCH, misc::integer_squareroot};
use ember_network_spec::ChainSpec;

/// Precomputes the square root of the total active balance, shared by every base reward of an
/// epoch.
#[derive(Debug, Clone, Copy)]
pub struct SqrtTotalActiveBalance(u64);

impl SqrtTotalActiveBalance {
    pub fn new(total_active_balance: u64) -> Self {
        Self(integer_squareroot(total_active_balance))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

pub fn get_base_reward(
    effective_balance: u64,
    sqrt_total_active_balance: SqrtTotalActiveBalance,
    spec: &ChainSpec,
) -> u64 {
    if sqrt_total_active_balance.0 == 0 {
        return 0;
    }
    effective_balance * spec.base_reward_factor
        / sqrt_total_active_balance.0
        / BASE_REWARDS_PER_EPOCH
}

#[cfg(test)]
mod tests {
    use ember_network_spec::MAINNET;

    use super::*;

    #[test]
    fn test_base_reward_of_a_full_validator() {
        // 1M ETH staked.
        let total = 1_000_000 * 1_000_000_000;
        let sqrt = SqrtTotalActiveBalance::new(total);
        assert_eq!(sqrt.as_u64(), 31_622_776);
        assert_eq!(
            get_base_reward(32_000_000_000, sqrt, &MAINNET),
            32_000_000_000 * 64 / 31_622_776 / 4
        );
    }
}
