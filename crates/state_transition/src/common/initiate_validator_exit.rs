use ember_consensus_beacon::{BeaconStateError, view::BeaconStateView};
use ember_consensus_misc::constants::FAR_FUTURE_EPOCH;
use ember_network_spec::ChainSpec;

/// Initiate the exit of the validator with index ``index``.
///
/// Exits are queued: at most `churn_limit` validators leave per epoch, later ones are pushed to
/// the following epoch. A validator that is already exiting is left untouched.
pub fn initiate_validator_exit<S: BeaconStateView>(
    state: &mut S,
    index: u64,
    spec: &ChainSpec,
) -> Result<(), BeaconStateError> {
    if state.validator(index)?.exit_epoch != FAR_FUTURE_EPOCH {
        return Ok(());
    }

    let current_epoch = state.get_current_epoch(spec);
    let mut exit_queue_epoch = state
        .validators()
        .iter()
        .map(|validator| validator.exit_epoch)
        .filter(|&exit_epoch| exit_epoch != FAR_FUTURE_EPOCH)
        .fold(spec.compute_activation_exit_epoch(current_epoch), u64::max);
    let exit_queue_churn = state
        .validators()
        .iter()
        .filter(|validator| validator.exit_epoch == exit_queue_epoch)
        .count() as u64;
    if exit_queue_churn >= state.get_validator_churn_limit(spec) {
        exit_queue_epoch += 1;
    }

    let validator = state.validator_mut(index)?;
    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch = exit_queue_epoch + spec.min_validator_withdrawability_delay;
    Ok(())
}
