use ember_consensus_beacon::{BeaconStateError, view::BeaconStateView};
use ember_consensus_misc::{
    constants::{EPOCHS_PER_SLASHINGS_VECTOR, PROPOSER_WEIGHT, WEIGHT_DENOMINATOR},
    fork::ForkName,
};
use ember_network_spec::ChainSpec;

use crate::common::initiate_validator_exit;

/// Slash the validator with index ``slashed_index``.
///
/// The whistleblower reward is split between the block proposer and the whistleblower, which
/// defaults to the proposer.
pub fn slash_validator<S: BeaconStateView>(
    state: &mut S,
    slashed_index: u64,
    proposer_index: u64,
    whistleblower_index: Option<u64>,
    spec: &ChainSpec,
) -> Result<(), BeaconStateError> {
    let epoch = state.get_current_epoch(spec);
    let fork = state.fork_name();
    initiate_validator_exit(state, slashed_index, spec)?;

    let validator = state.validator_mut(slashed_index)?;
    validator.slashed = true;
    validator.withdrawable_epoch = validator
        .withdrawable_epoch
        .max(epoch + EPOCHS_PER_SLASHINGS_VECTOR);
    let effective_balance = validator.effective_balance;

    let slashings_index = state.slashings_index(epoch);
    let slashings = &mut state.slashings_mut()[slashings_index];
    *slashings = slashings.saturating_add(effective_balance);
    state.decrease_balance(
        slashed_index,
        effective_balance / spec.min_slashing_penalty_quotient_for(fork),
    )?;

    // Apply proposer and whistleblower rewards
    let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward = effective_balance / spec.whistleblower_reward_quotient;
    let proposer_reward = match fork {
        ForkName::Phase0 => whistleblower_reward / spec.proposer_reward_quotient,
        ForkName::Altair => whistleblower_reward * PROPOSER_WEIGHT / WEIGHT_DENOMINATOR,
    };
    state.increase_balance(proposer_index, proposer_reward)?;
    state.increase_balance(whistleblower_index, whistleblower_reward - proposer_reward)?;
    Ok(())
}
