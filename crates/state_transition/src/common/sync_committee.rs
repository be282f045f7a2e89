use std::sync::Arc;

use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::{
    constants::{DOMAIN_SYNC_COMMITTEE, SYNC_COMMITTEE_SIZE},
    sync_committee::SyncCommittee,
};
use ssz_types::FixedVector;

use crate::{
    context::TransitionContext,
    epoch_context::sample_by_effective_balance,
    errors::{EpochContextError, EpochProcessingError},
};

/// Return the sync committee indices, with possible duplicates, for the next sync committee.
pub fn get_next_sync_committee_indices<S: BeaconStateView>(
    state: &S,
    ctx: &TransitionContext,
) -> Result<Vec<u64>, EpochContextError> {
    let epoch = state.get_current_epoch(ctx.spec) + 1;
    let active_validator_indices = state.get_active_validator_indices(epoch);
    if active_validator_indices.is_empty() {
        return Err(EpochContextError::NoActiveValidators(epoch));
    }
    let seed = state.get_seed(epoch, DOMAIN_SYNC_COMMITTEE, ctx.spec);
    sample_by_effective_balance(
        state,
        &active_validator_indices,
        seed,
        SYNC_COMMITTEE_SIZE as usize,
        ctx.spec,
    )?
    .ok_or(EpochContextError::SyncCommitteeSelectionExhausted(epoch))
}

/// Return the next sync committee, with possible pubkey duplicates.
pub fn get_next_sync_committee<S: BeaconStateView>(
    state: &S,
    ctx: &TransitionContext,
) -> Result<Arc<SyncCommittee>, EpochProcessingError> {
    let pubkeys = get_next_sync_committee_indices(state, ctx)?
        .into_iter()
        .map(|index| {
            state
                .validator(index)
                .map(|validator| validator.pubkey.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;
    let aggregate_pubkey = ctx
        .verifier
        .aggregate_pubkeys(&pubkeys.iter().collect::<Vec<_>>())?;
    Ok(Arc::new(SyncCommittee {
        pubkeys: FixedVector::from(pubkeys),
        aggregate_pubkey,
    }))
}
