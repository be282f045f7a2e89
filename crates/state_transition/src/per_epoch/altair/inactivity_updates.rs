use ember_consensus_beacon::{BeaconStateError, view::ParticipationView};
use ember_consensus_misc::constants::{GENESIS_EPOCH, TIMELY_TARGET_FLAG_INDEX};

use super::ParticipationCache;
use crate::{context::TransitionContext, errors::EpochProcessingError};

/// Raises the inactivity score of eligible validators that missed the previous target and lets
/// every score recover outside of an inactivity leak.
pub fn process_inactivity_updates<S: ParticipationView>(
    state: &mut S,
    participation_cache: &ParticipationCache,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let spec = ctx.spec;
    // Score updates based on previous epoch participation, skip genesis epoch
    if state.get_current_epoch(spec) == GENESIS_EPOCH {
        return Ok(());
    }
    let is_in_inactivity_leak = state.is_in_inactivity_leak(spec);

    for index in 0..participation_cache.validator_count() {
        ctx.check_cancelled_at(index)?;
        if !participation_cache.is_eligible(index) {
            continue;
        }
        let inactivity_score = state
            .inactivity_scores_mut()
            .get_mut(index)
            .ok_or(BeaconStateError::UnknownValidator(index as u64))?;

        // Increase inactivity score of inactive validators
        if participation_cache.is_previous_epoch_participant(index, TIMELY_TARGET_FLAG_INDEX) {
            *inactivity_score -= (*inactivity_score).min(1);
        } else {
            *inactivity_score += spec.inactivity_score_bias;
        }
        // Decrease the score of all validators for forgiveness when not during a leak
        if !is_in_inactivity_leak {
            *inactivity_score -= (*inactivity_score).min(spec.inactivity_score_recovery_rate);
        }
    }
    Ok(())
}
