use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::attestation::Attestation;

use crate::{
    common::{get_indexed_attestation, is_valid_indexed_attestation},
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{AttestationInvalid as Invalid, BlockOperationError},
};

/// Checks shared by both forks: target epoch, inclusion window, committee index and the aggregate
/// signature. The source checkpoint is checked by the fork-specific recorder.
///
/// Returns the committee the attestation was made by.
pub fn verify_attestation<'a, S: BeaconStateView>(
    state: &S,
    attestation: &Attestation,
    epochs_ctx: &'a EpochsContext,
    ctx: &TransitionContext,
) -> Result<&'a [u64], BlockOperationError<Invalid>> {
    let spec = ctx.spec;
    let data = &attestation.data;
    let current_epoch = state.get_current_epoch(spec);
    let previous_epoch = state.get_previous_epoch(spec);

    verify!(
        data.target.epoch == previous_epoch || data.target.epoch == current_epoch,
        Invalid::BadTargetEpoch {
            target_epoch: data.target.epoch,
            previous_epoch,
            current_epoch,
        }
    );
    verify!(
        data.target.epoch == spec.compute_epoch_at_slot(data.slot),
        Invalid::TargetEpochSlotMismatch {
            target_epoch: data.target.epoch,
            slot: data.slot,
        }
    );
    verify!(
        data.slot + spec.min_attestation_inclusion_delay <= state.slot(),
        Invalid::IncludedTooEarly {
            state_slot: state.slot(),
            attestation_slot: data.slot,
        }
    );
    verify!(
        state.slot() <= data.slot + spec.slots_per_epoch,
        Invalid::IncludedTooLate {
            state_slot: state.slot(),
            attestation_slot: data.slot,
        }
    );

    let committees_per_slot = epochs_ctx.get_committee_count_per_slot(data.target.epoch)?;
    verify!(
        data.index < committees_per_slot,
        Invalid::BadCommitteeIndex {
            index: data.index,
            committees_per_slot,
        }
    );
    let committee = epochs_ctx.get_beacon_committee(data.slot, data.index)?;

    let indexed_attestation =
        get_indexed_attestation(committee, attestation).map_err(BlockOperationError::invalid)?;
    is_valid_indexed_attestation(state, &indexed_attestation, epochs_ctx, ctx)
        .map_err(|err| err.map_invalid(Invalid::BadIndexedAttestation))?;
    Ok(committee)
}
