use ember_consensus_beacon::view::BeaconStateView;
use itertools::Itertools;
use tracing::trace;

use crate::{
    common::initiate_validator_exit, context::TransitionContext, errors::EpochProcessingError,
};

/// Moves validators through the activation queue and ejects those whose effective balance fell
/// to the ejection balance.
pub fn process_registry_updates<S: BeaconStateView>(
    state: &mut S,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let spec = ctx.spec;
    let current_epoch = state.get_current_epoch(spec);

    // Process activation eligibility and ejections
    for index in 0..state.validators().len() {
        ctx.check_cancelled_at(index)?;
        let validator = state.validator_mut(index as u64)?;
        if validator.is_eligible_for_activation_queue(spec.max_effective_balance) {
            validator.activation_eligibility_epoch = current_epoch + 1;
        }
        if validator.is_active_validator(current_epoch)
            && validator.effective_balance <= spec.ejection_balance
        {
            trace!(index, "Ejecting validator");
            initiate_validator_exit(state, index as u64, spec)?;
        }
    }

    // Queue validators eligible for activation and not yet dequeued for activation
    let finalized_epoch = state.finalized_checkpoint().epoch;
    let activation_queue = state
        .validators()
        .iter()
        .enumerate()
        .filter(|(_, validator)| validator.is_eligible_for_activation(finalized_epoch))
        // Order by the sequence of activation_eligibility_epoch setting and then index
        .sorted_by_key(|(index, validator)| (validator.activation_eligibility_epoch, *index))
        .map(|(index, _)| index as u64)
        .collect::<Vec<_>>();

    // Dequeued validators for activation up to churn limit
    let churn_limit = state.get_validator_churn_limit(spec) as usize;
    let activation_epoch = spec.compute_activation_exit_epoch(current_epoch);
    for index in activation_queue.into_iter().take(churn_limit) {
        state.validator_mut(index)?.activation_epoch = activation_epoch;
    }
    Ok(())
}
