use ember_consensus_beacon::{BeaconStateError, view::BeaconStateView};
use ember_consensus_misc::constants::BASE_REWARDS_PER_EPOCH;
use ember_network_spec::ChainSpec;

use super::validator_statuses::{ValidatorStatus, ValidatorStatuses};
use crate::{
    common::base::{SqrtTotalActiveBalance, get_base_reward},
    context::TransitionContext,
    errors::EpochProcessingError,
    per_epoch::Deltas,
};

/// Computes and applies every phase0 attestation reward and penalty of the previous epoch.
pub fn process_rewards_and_penalties<S: BeaconStateView>(
    state: &mut S,
    validator_statuses: &ValidatorStatuses,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let deltas = get_attestation_deltas(state, validator_statuses, ctx)?;
    deltas.apply(state, ctx)
}

/// Sums the source, target, head, inclusion delay and inactivity components per validator.
pub fn get_attestation_deltas<S: BeaconStateView>(
    state: &S,
    validator_statuses: &ValidatorStatuses,
    ctx: &TransitionContext,
) -> Result<Deltas, EpochProcessingError> {
    let spec = ctx.spec;
    let totals = &validator_statuses.total_balances;
    let total_active_balance = totals.current_epoch();
    let sqrt_total_active_balance = SqrtTotalActiveBalance::new(total_active_balance);
    let is_in_inactivity_leak = state.is_in_inactivity_leak(spec);
    let finality_delay = state.get_finality_delay(spec);
    let components: [(u64, fn(&ValidatorStatus) -> bool); 3] = [
        (
            totals.previous_epoch_source_attesters(),
            ValidatorStatus::is_unslashed_previous_source_attester,
        ),
        (
            totals.previous_epoch_target_attesters(),
            ValidatorStatus::is_unslashed_previous_target_attester,
        ),
        (
            totals.previous_epoch_head_attesters(),
            ValidatorStatus::is_unslashed_previous_head_attester,
        ),
    ];

    let mut deltas = Deltas::new(validator_statuses.statuses.len());
    for (index, status) in validator_statuses.statuses.iter().enumerate() {
        ctx.check_cancelled_at(index)?;
        if !status.is_eligible {
            continue;
        }
        let base_reward =
            get_base_reward(status.effective_balance, sqrt_total_active_balance, spec);
        let proposer_reward = base_reward / spec.proposer_reward_quotient;

        for (attesting_balance, is_attester) in &components {
            if is_attester(status) {
                if is_in_inactivity_leak {
                    // Optimal participation is fully rewarded to cancel the inactivity penalty.
                    deltas.reward(index, base_reward);
                } else {
                    let reward = component_reward(
                        base_reward,
                        *attesting_balance,
                        total_active_balance,
                        spec,
                    );
                    deltas.reward(index, reward);
                }
            } else {
                deltas.penalize(index, base_reward);
            }
        }

        // Inclusion delay: the attester is rewarded for speed, the including proposer for the
        // inclusion itself.
        if status.is_unslashed_previous_source_attester() {
            if let Some(inclusion_info) = status.inclusion_info {
                let proposer_index = inclusion_info.proposer_index as usize;
                if proposer_index >= deltas.len() {
                    return Err(
                        BeaconStateError::UnknownValidator(inclusion_info.proposer_index).into(),
                    );
                }
                deltas.reward(proposer_index, proposer_reward);
                let max_attester_reward = base_reward - proposer_reward;
                deltas.reward(index, max_attester_reward / inclusion_info.delay.max(1));
            }
        }

        if is_in_inactivity_leak {
            // Full base penalty for every eligible validator, offset by optimal participation.
            deltas.penalize(index, BASE_REWARDS_PER_EPOCH * base_reward - proposer_reward);
            if !status.is_unslashed_previous_target_attester() {
                deltas.penalize(
                    index,
                    status.effective_balance * finality_delay
                        / spec.inactivity_penalty_quotient_for(state.fork_name()),
                );
            }
        }
    }
    Ok(deltas)
}

fn component_reward(
    base_reward: u64,
    attesting_balance: u64,
    total_balance: u64,
    spec: &ChainSpec,
) -> u64 {
    // Factored out from balance totals to avoid uint64 overflow
    let increment = spec.effective_balance_increment;
    let reward_numerator = base_reward * (attesting_balance / increment);
    reward_numerator / (total_balance / increment)
}
