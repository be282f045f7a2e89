use ember_consensus_beacon::view::BeaconStateView;

use crate::{context::TransitionContext, errors::EpochProcessingError};

/// Per-validator reward and penalty totals for one epoch, in Gwei.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deltas {
    rewards: Vec<u64>,
    penalties: Vec<u64>,
}

impl Deltas {
    pub fn new(validator_count: usize) -> Self {
        Self {
            rewards: vec![0; validator_count],
            penalties: vec![0; validator_count],
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn reward(&mut self, index: usize, amount: u64) {
        self.rewards[index] = self.rewards[index].saturating_add(amount);
    }

    pub fn penalize(&mut self, index: usize, amount: u64) {
        self.penalties[index] = self.penalties[index].saturating_add(amount);
    }

    pub fn rewards(&self) -> &[u64] {
        &self.rewards
    }

    pub fn penalties(&self) -> &[u64] {
        &self.penalties
    }

    /// Applies every delta in one pass: the reward is credited before the penalty is debited, and
    /// the debit floors at zero.
    pub fn apply<S: BeaconStateView>(
        &self,
        state: &mut S,
        ctx: &TransitionContext,
    ) -> Result<(), EpochProcessingError> {
        let validators = state.validators().len();
        if self.len() != validators {
            return Err(EpochProcessingError::DeltasLengthMismatch {
                kind: "reward",
                deltas: self.len(),
                validators,
            });
        }
        for (index, (&reward, &penalty)) in self.rewards.iter().zip(&self.penalties).enumerate() {
            ctx.check_cancelled_at(index)?;
            state.increase_balance(index as u64, reward)?;
            state.decrease_balance(index as u64, penalty)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ember_bls::{FakeVerifier, PubKey};
    use ember_consensus_beacon::phase0::beacon_state::BeaconState;
    use ember_consensus_misc::validator::Validator;
    use ember_network_spec::MINIMAL;

    use super::*;

    fn state(balances: &[u64]) -> BeaconState {
        let mut state = BeaconState::default();
        for &balance in balances {
            let validator = Validator::from_deposit(
                PubKey::default(),
                B256::ZERO,
                balance,
                MINIMAL.effective_balance_increment,
                MINIMAL.max_effective_balance,
            );
            state.push_validator(validator, balance).unwrap();
        }
        state
    }

    #[test]
    fn test_rewards_land_before_penalties() {
        let mut state = state(&[10, 10, 10]);
        let mut deltas = Deltas::new(3);
        deltas.reward(0, 5);
        deltas.penalize(0, 12);
        deltas.penalize(1, 25);
        deltas.reward(2, 1);
        deltas.reward(2, 1);

        let verifier = FakeVerifier::default();
        deltas
            .apply(&mut state, &TransitionContext::new(&MINIMAL, &verifier))
            .unwrap();
        assert_eq!(state.balances.to_vec(), vec![3, 0, 12]);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let mut state = state(&[10, 10]);
        let verifier = FakeVerifier::default();
        assert_eq!(
            Deltas::new(3).apply(&mut state, &TransitionContext::new(&MINIMAL, &verifier)),
            Err(EpochProcessingError::DeltasLengthMismatch {
                kind: "reward",
                deltas: 3,
                validators: 2
            })
        );
    }
}
