use ember_consensus_beacon::{
    BeaconStateError, altair::participation_flags::has_flag, view::ParticipationView,
};
use ember_consensus_misc::constants::{NUM_FLAG_INDICES, TIMELY_TARGET_FLAG_INDEX};

use crate::{context::TransitionContext, errors::EpochProcessingError};

/// Participation of the previous and current epoch, read once from the flag lists so the later
/// stages never walk the registry for balances again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipationCache {
    effective_balance_increment: u64,
    current_epoch_total_active_balance: u64,
    /// Unslashed participating balance of the previous epoch, per flag index.
    previous_epoch_flag_balances: [u64; NUM_FLAG_INDICES],
    current_epoch_target_balance: u64,
    /// Previous epoch flags, cleared for validators that were slashed or inactive.
    previous_epoch_flags: Vec<u8>,
    eligible: Vec<bool>,
    effective_balances: Vec<u64>,
}

impl ParticipationCache {
    pub fn new<S: ParticipationView>(
        state: &S,
        ctx: &TransitionContext,
    ) -> Result<Self, EpochProcessingError> {
        let spec = ctx.spec;
        let current_epoch = state.get_current_epoch(spec);
        let previous_epoch = state.get_previous_epoch(spec);
        let validator_count = state.validators().len();
        let current_participation = state.current_epoch_participation();
        // At genesis both epochs are the same one and share the current list.
        let previous_participation = if previous_epoch == current_epoch {
            current_participation
        } else {
            state.previous_epoch_participation()
        };
        if let Some(extra) = [current_participation.len(), previous_participation.len()]
            .into_iter()
            .find(|&len| len != validator_count)
        {
            return Err(BeaconStateError::RegistryLengthMismatch {
                validators: validator_count,
                balances: state.balances().len(),
                extra,
            }
            .into());
        }

        let mut cache = Self {
            effective_balance_increment: spec.effective_balance_increment,
            current_epoch_total_active_balance: 0,
            previous_epoch_flag_balances: [0; NUM_FLAG_INDICES],
            current_epoch_target_balance: 0,
            previous_epoch_flags: Vec::with_capacity(validator_count),
            eligible: Vec::with_capacity(validator_count),
            effective_balances: Vec::with_capacity(validator_count),
        };
        for (index, validator) in state.flatten_validators().into_iter().enumerate() {
            ctx.check_cancelled_at(index)?;
            let effective_balance = validator.effective_balance;
            if validator.is_active(current_epoch) {
                cache.current_epoch_total_active_balance += effective_balance;
                if !validator.slashed
                    && has_flag(current_participation[index], TIMELY_TARGET_FLAG_INDEX)
                {
                    cache.current_epoch_target_balance += effective_balance;
                }
            }

            let previous_flags = if validator.is_active(previous_epoch) && !validator.slashed {
                previous_participation[index]
            } else {
                0
            };
            for (flag_index, balance) in cache.previous_epoch_flag_balances.iter_mut().enumerate()
            {
                if has_flag(previous_flags, flag_index as u8) {
                    *balance += effective_balance;
                }
            }
            cache.previous_epoch_flags.push(previous_flags);
            cache
                .eligible
                .push(validator.is_eligible_for_rewards(previous_epoch));
            cache.effective_balances.push(effective_balance);
        }
        Ok(cache)
    }

    pub fn current_epoch_total_active_balance(&self) -> u64 {
        self.current_epoch_total_active_balance
            .max(self.effective_balance_increment)
    }

    pub fn current_epoch_target_attesting_balance(&self) -> u64 {
        self.current_epoch_target_balance
            .max(self.effective_balance_increment)
    }

    pub fn previous_epoch_flag_attesting_balance(&self, flag_index: u8) -> u64 {
        self.previous_epoch_flag_balances
            .get(flag_index as usize)
            .copied()
            .unwrap_or_default()
            .max(self.effective_balance_increment)
    }

    pub fn previous_epoch_target_attesting_balance(&self) -> u64 {
        self.previous_epoch_flag_attesting_balance(TIMELY_TARGET_FLAG_INDEX)
    }

    /// Active and unslashed in the previous epoch with `flag_index` set.
    pub fn is_previous_epoch_participant(&self, index: usize, flag_index: u8) -> bool {
        self.previous_epoch_flags
            .get(index)
            .is_some_and(|&flags| has_flag(flags, flag_index))
    }

    pub fn is_eligible(&self, index: usize) -> bool {
        self.eligible.get(index).copied().unwrap_or(false)
    }

    pub fn effective_balance(&self, index: usize) -> u64 {
        self.effective_balances.get(index).copied().unwrap_or(0)
    }

    pub fn validator_count(&self) -> usize {
        self.eligible.len()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ember_bls::{FakeVerifier, PubKey};
    use ember_consensus_beacon::altair::beacon_state::BeaconState;
    use ember_consensus_beacon::view::BeaconStateView;
    use ember_consensus_misc::{
        constants::{TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX},
        validator::Validator,
    };
    use ember_network_spec::MINIMAL;

    use super::*;

    const BALANCE: u64 = 32_000_000_000;

    #[test]
    fn test_slashed_and_inactive_validators_do_not_count() {
        let mut state = BeaconState {
            slot: 3 * MINIMAL.slots_per_epoch,
            ..Default::default()
        };
        for index in 0..4u64 {
            let mut validator = Validator::from_deposit(
                PubKey::default(),
                B256::ZERO,
                BALANCE,
                MINIMAL.effective_balance_increment,
                MINIMAL.max_effective_balance,
            );
            validator.activation_epoch = if index == 3 { 10 } else { 0 };
            validator.slashed = index == 2;
            state.push_validator(validator, BALANCE).unwrap();
        }
        for index in 0..4 {
            state.previous_epoch_participation[index] = 0b111;
        }
        state.current_epoch_participation[1] = 0b010;

        let verifier = FakeVerifier::default();
        let cache =
            ParticipationCache::new(&state, &TransitionContext::new(&MINIMAL, &verifier)).unwrap();
        assert_eq!(cache.current_epoch_total_active_balance(), 3 * BALANCE);
        assert_eq!(cache.current_epoch_target_attesting_balance(), BALANCE);
        for flag_index in [TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX, TIMELY_HEAD_FLAG_INDEX]
        {
            assert_eq!(cache.previous_epoch_flag_attesting_balance(flag_index), 2 * BALANCE);
        }
        assert!(cache.is_previous_epoch_participant(0, TIMELY_TARGET_FLAG_INDEX));
        assert!(!cache.is_previous_epoch_participant(2, TIMELY_TARGET_FLAG_INDEX));
        // Slashed validators are still penalized, pending ones are not touched.
        assert!(cache.is_eligible(2));
        assert!(!cache.is_eligible(3));
    }

    #[test]
    fn test_empty_participation_floors_at_one_increment() {
        let state = BeaconState::default();
        let verifier = FakeVerifier::default();
        let cache =
            ParticipationCache::new(&state, &TransitionContext::new(&MINIMAL, &verifier)).unwrap();
        assert_eq!(
            cache.previous_epoch_target_attesting_balance(),
            MINIMAL.effective_balance_increment
        );
        assert_eq!(cache.validator_count(), 0);
    }
}
