use ember_consensus_beacon::{BeaconStateError, view::ParticipationView};
use ember_consensus_misc::constants::{
    PARTICIPATION_FLAG_WEIGHTS, TIMELY_HEAD_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX,
    WEIGHT_DENOMINATOR,
};

use super::ParticipationCache;
use crate::{
    common::altair::{BaseRewardPerIncrement, get_base_reward},
    context::TransitionContext,
    errors::EpochProcessingError,
    per_epoch::Deltas,
};

/// Computes the flag and inactivity deltas of the previous epoch and applies them in one pass.
pub fn process_rewards_and_penalties<S: ParticipationView>(
    state: &mut S,
    participation_cache: &ParticipationCache,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let mut deltas = Deltas::new(participation_cache.validator_count());
    for (flag_index, &weight) in PARTICIPATION_FLAG_WEIGHTS.iter().enumerate() {
        get_flag_index_deltas(
            &mut deltas,
            state,
            flag_index as u8,
            weight,
            participation_cache,
            ctx,
        )?;
    }
    get_inactivity_penalty_deltas(&mut deltas, state, participation_cache, ctx)?;
    deltas.apply(state, ctx)
}

/// Adds the reward or penalty of one participation flag for every eligible validator.
pub fn get_flag_index_deltas<S: ParticipationView>(
    deltas: &mut Deltas,
    state: &S,
    flag_index: u8,
    weight: u64,
    participation_cache: &ParticipationCache,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let spec = ctx.spec;
    let increment = spec.effective_balance_increment;
    let total_active_balance = participation_cache.current_epoch_total_active_balance();
    let base_reward_per_increment = BaseRewardPerIncrement::new(total_active_balance, spec);
    let participating_increments =
        participation_cache.previous_epoch_flag_attesting_balance(flag_index) / increment;
    let active_increments = total_active_balance / increment;
    let is_in_inactivity_leak = state.is_in_inactivity_leak(spec);

    for index in 0..participation_cache.validator_count() {
        ctx.check_cancelled_at(index)?;
        if !participation_cache.is_eligible(index) {
            continue;
        }
        let base_reward = get_base_reward(
            participation_cache.effective_balance(index),
            base_reward_per_increment,
            spec,
        );
        if participation_cache.is_previous_epoch_participant(index, flag_index) {
            if !is_in_inactivity_leak {
                let reward_numerator = base_reward * weight * participating_increments;
                deltas.reward(index, reward_numerator / (active_increments * WEIGHT_DENOMINATOR));
            }
        } else if flag_index != TIMELY_HEAD_FLAG_INDEX {
            deltas.penalize(index, base_reward * weight / WEIGHT_DENOMINATOR);
        }
    }
    Ok(())
}

/// Adds the inactivity penalty of every eligible validator that missed the previous target.
pub fn get_inactivity_penalty_deltas<S: ParticipationView>(
    deltas: &mut Deltas,
    state: &S,
    participation_cache: &ParticipationCache,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let spec = ctx.spec;
    let penalty_denominator =
        spec.inactivity_score_bias * spec.inactivity_penalty_quotient_for(state.fork_name());
    for index in 0..participation_cache.validator_count() {
        ctx.check_cancelled_at(index)?;
        if !participation_cache.is_eligible(index)
            || participation_cache.is_previous_epoch_participant(index, TIMELY_TARGET_FLAG_INDEX)
        {
            continue;
        }
        let inactivity_score = state.inactivity_scores().get(index).copied().ok_or(
            BeaconStateError::RegistryLengthMismatch {
                validators: state.validators().len(),
                balances: state.balances().len(),
                extra: state.inactivity_scores().len(),
            },
        )?;
        let penalty_numerator = participation_cache.effective_balance(index) * inactivity_score;
        deltas.penalize(index, penalty_numerator / penalty_denominator);
    }
    Ok(())
}
