use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::attester_slashing::AttesterSlashing;

use crate::{
    common::{is_valid_indexed_attestation, sorted_intersection},
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{AttesterSlashingInvalid as Invalid, BlockOperationError},
};

/// Indicates if an `AttesterSlashing` is valid to be included in a block in the current epoch of
/// the given state.
///
/// Returns the indices of the validators it slashes, in increasing order.
pub fn verify_attester_slashing<S: BeaconStateView>(
    state: &S,
    attester_slashing: &AttesterSlashing,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<Vec<u64>, BlockOperationError<Invalid>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    // Double vote or surround vote
    verify!(
        attestation_1.data.is_slashable_pair(&attestation_2.data),
        Invalid::NotSlashable
    );
    is_valid_indexed_attestation(state, attestation_1, epochs_ctx, ctx)
        .map_err(|err| err.map_invalid(|reason| Invalid::IndexedAttestationInvalid(1, reason)))?;
    is_valid_indexed_attestation(state, attestation_2, epochs_ctx, ctx)
        .map_err(|err| err.map_invalid(|reason| Invalid::IndexedAttestationInvalid(2, reason)))?;

    get_slashable_indices(state, attester_slashing, ctx)
}

/// Validators attesting to both sides of the slashing that can still be slashed.
pub fn get_slashable_indices<S: BeaconStateView>(
    state: &S,
    attester_slashing: &AttesterSlashing,
    ctx: &TransitionContext,
) -> Result<Vec<u64>, BlockOperationError<Invalid>> {
    let epoch = state.get_current_epoch(ctx.spec);
    let mut slashable_indices = vec![];
    for index in sorted_intersection(
        &attester_slashing.attestation_1.attesting_indices,
        &attester_slashing.attestation_2.attesting_indices,
    ) {
        if state.validator(index)?.is_slashable_validator(epoch) {
            slashable_indices.push(index);
        }
    }
    verify!(!slashable_indices.is_empty(), Invalid::NoSlashableIndices);
    Ok(slashable_indices)
}
