use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::{
    constants::{DOMAIN_VOLUNTARY_EXIT, FAR_FUTURE_EPOCH},
    misc::compute_signing_root,
    voluntary_exit::SignedVoluntaryExit,
};

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{BlockOperationError, EpochContextError, ExitInvalid as Invalid},
};

/// Indicates if an `Exit` is valid to be included in a block in the current epoch of the given
/// state.
pub fn verify_exit<S: BeaconStateView>(
    state: &S,
    signed_exit: &SignedVoluntaryExit,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<Invalid>> {
    let spec = ctx.spec;
    let exit = &signed_exit.message;
    let current_epoch = state.get_current_epoch(spec);
    let validator = state.validator(exit.validator_index)?;

    // Verify the validator is active
    verify!(
        validator.is_active_validator(current_epoch),
        Invalid::NotActive(exit.validator_index)
    );
    // Verify exit has not been initiated
    verify!(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        Invalid::AlreadyExited(exit.validator_index)
    );
    // Exits must specify an epoch when they become valid; they are not valid before then
    verify!(
        current_epoch >= exit.epoch,
        Invalid::FutureEpoch {
            current_epoch,
            exit_epoch: exit.epoch,
        }
    );
    // Verify the validator has been active long enough
    let earliest_exit_epoch = validator
        .activation_epoch
        .saturating_add(spec.shard_committee_period);
    verify!(
        current_epoch >= earliest_exit_epoch,
        Invalid::TooYoungToExit(earliest_exit_epoch)
    );

    let pubkey = epochs_ctx
        .pubkey_cache
        .get_pubkey(exit.validator_index)
        .ok_or(EpochContextError::MissingPubkey(exit.validator_index))?;
    let domain = state.get_domain(DOMAIN_VOLUNTARY_EXIT, Some(exit.epoch), spec);
    let signing_root = compute_signing_root(exit, domain);
    verify!(
        ctx.verifier
            .verify(&pubkey, signing_root.as_slice(), &signed_exit.signature),
        Invalid::BadSignature
    );
    Ok(())
}
