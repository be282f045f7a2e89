//! Phase0 attestations are stored as pending records and only accounted at the epoch boundary.

use ember_consensus_beacon::{
    BeaconStateError, altair::sync_aggregate::SyncAggregate, phase0::beacon_state::BeaconState,
    view::BeaconStateView,
};
use ember_consensus_misc::{attestation::Attestation, pending_attestation::PendingAttestation};

use super::{BlockProcessingState, verify_attestation};
use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{AttestationInvalid, BlockOperationError, BlockProcessingError, IntoWithIndex},
};

/// Validates each `Attestation` and records it, short-circuiting on an invalid one.
pub fn process_attestations(
    state: &mut BeaconState,
    attestations: &[Attestation],
    proposer_index: u64,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockProcessingError> {
    for (index, attestation) in attestations.iter().enumerate() {
        process_attestation(state, attestation, proposer_index, epochs_ctx, ctx)
            .map_err(|err| err.into_with_index(index))?;
    }
    Ok(())
}

pub fn process_attestation(
    state: &mut BeaconState,
    attestation: &Attestation,
    proposer_index: u64,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<AttestationInvalid>> {
    verify_attestation(state, attestation, epochs_ctx, ctx)?;

    let data = &attestation.data;
    let pending_attestation = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data: data.clone(),
        inclusion_delay: state.slot - data.slot,
        proposer_index,
    };
    if data.target.epoch == state.get_current_epoch(ctx.spec) {
        verify!(
            data.source == state.current_justified_checkpoint,
            AttestationInvalid::WrongJustifiedCheckpoint
        );
        state
            .current_epoch_attestations
            .push(pending_attestation)
            .map_err(|_| BeaconStateError::ListFull("current_epoch_attestations"))?;
    } else {
        verify!(
            data.source == state.previous_justified_checkpoint,
            AttestationInvalid::WrongJustifiedCheckpoint
        );
        state
            .previous_epoch_attestations
            .push(pending_attestation)
            .map_err(|_| BeaconStateError::ListFull("previous_epoch_attestations"))?;
    }
    Ok(())
}

impl BlockProcessingState for BeaconState {
    fn process_attestations(
        &mut self,
        attestations: &[Attestation],
        proposer_index: u64,
        epochs_ctx: &EpochsContext,
        ctx: &TransitionContext,
    ) -> Result<(), BlockProcessingError> {
        process_attestations(self, attestations, proposer_index, epochs_ctx, ctx)
    }

    /// Phase0 blocks carry no sync aggregate.
    fn process_sync_aggregate(
        &mut self,
        _sync_aggregate: Option<&SyncAggregate>,
        _proposer_index: u64,
        _epochs_ctx: &EpochsContext,
        _ctx: &TransitionContext,
    ) -> Result<(), BlockProcessingError> {
        Ok(())
    }
}
