use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::constants::EPOCHS_PER_SLASHINGS_VECTOR;

use crate::{context::TransitionContext, errors::EpochProcessingError};

/// Applies the proportional slashing penalty to validators halfway through their withdrawal
/// delay. The penalty scales with the total amount slashed in the surrounding window.
pub fn process_slashings<S: BeaconStateView>(
    state: &mut S,
    total_active_balance: u64,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let spec = ctx.spec;
    let epoch = state.get_current_epoch(spec);
    let multiplier = spec.proportional_slashing_multiplier_for(state.fork_name());
    let adjusted_total_slashing_balance = state
        .get_slashings_sum()
        .saturating_mul(multiplier)
        .min(total_active_balance);
    let increment = spec.effective_balance_increment;
    let target_withdrawable_epoch = epoch + EPOCHS_PER_SLASHINGS_VECTOR / 2;

    for index in 0..state.validators().len() {
        ctx.check_cancelled_at(index)?;
        let validator = state.validator(index as u64)?;
        if !validator.slashed || validator.withdrawable_epoch != target_withdrawable_epoch {
            continue;
        }
        // Factored out from penalty numerator to avoid uint64 overflow
        let penalty_numerator =
            validator.effective_balance / increment * adjusted_total_slashing_balance;
        let penalty = penalty_numerator / total_active_balance * increment;
        state.decrease_balance(index as u64, penalty)?;
    }
    Ok(())
}
