//! Fork upgrades, run by slot processing at the first slot of the fork epoch.

use ember_consensus_beacon::{
    BeaconStateError, altair, altair::participation_flags::add_flag, phase0,
    view::BeaconStateView,
};
use ember_consensus_misc::{fork::Fork, pending_attestation::PendingAttestation};
use ssz_types::VariableList;
use tracing::info;

use crate::{
    common::{
        altair::get_attestation_participation_flag_indices, get_attesting_indices,
        sync_committee::get_next_sync_committee,
    },
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{BlockOperationError, UpgradeError},
};

/// Sets the previous epoch participation flags of `post` from the pending attestations the phase0
/// state collected during that epoch.
pub fn translate_participation<'a>(
    post: &mut altair::beacon_state::BeaconState,
    pending_attestations: impl IntoIterator<Item = &'a PendingAttestation>,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), UpgradeError> {
    for attestation in pending_attestations {
        let data = &attestation.data;

        // Translate attestation inclusion info to flag indices
        let participation_flag_indices = get_attestation_participation_flag_indices(
            post,
            data,
            attestation.inclusion_delay,
            ctx.spec,
        )?;

        // Apply flags to all attesting validators
        let committee = epochs_ctx.get_beacon_committee(data.slot, data.index)?;
        let attesting_indices = get_attesting_indices(committee, &attestation.aggregation_bits)
            .map_err(BlockOperationError::invalid)?;
        for index in attesting_indices {
            let flags = post
                .previous_epoch_participation
                .get_mut(index as usize)
                .ok_or(BeaconStateError::UnknownValidator(index))?;
            for &flag_index in &participation_flag_indices {
                *flags = add_flag(*flags, flag_index);
            }
        }
    }
    Ok(())
}

/// Transforms a phase0 state into an altair state. `epochs_ctx` must already cover the upgrade
/// epoch, so that the previous epoch's committees are available.
pub fn upgrade_to_altair(
    pre: &phase0::beacon_state::BeaconState,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<altair::beacon_state::BeaconState, UpgradeError> {
    let spec = ctx.spec;
    let epoch = pre.get_current_epoch(spec);
    let validator_count = pre.validators.len();

    let mut post = altair::beacon_state::BeaconState {
        // Versioning
        genesis_time: pre.genesis_time,
        genesis_validators_root: pre.genesis_validators_root,
        slot: pre.slot,
        fork: Fork {
            previous_version: pre.fork.current_version,
            current_version: spec.altair_fork_version,
            epoch,
        },
        // History
        latest_block_header: pre.latest_block_header.clone(),
        block_roots: pre.block_roots.clone(),
        state_roots: pre.state_roots.clone(),
        historical_roots: pre.historical_roots.clone(),
        // Eth1
        eth1_data: pre.eth1_data.clone(),
        eth1_data_votes: pre.eth1_data_votes.clone(),
        eth1_deposit_index: pre.eth1_deposit_index,
        // Registry
        validators: pre.validators.clone(),
        balances: pre.balances.clone(),
        // Randomness
        randao_mixes: pre.randao_mixes.clone(),
        // Slashings
        slashings: pre.slashings.clone(),
        // Participation
        previous_epoch_participation: VariableList::from(vec![0; validator_count]),
        current_epoch_participation: VariableList::from(vec![0; validator_count]),
        // Finality
        justification_bits: pre.justification_bits.clone(),
        previous_justified_checkpoint: pre.previous_justified_checkpoint,
        current_justified_checkpoint: pre.current_justified_checkpoint,
        finalized_checkpoint: pre.finalized_checkpoint,
        // Inactivity
        inactivity_scores: VariableList::from(vec![0; validator_count]),
        // Sync, filled in below
        current_sync_committee: Default::default(),
        next_sync_committee: Default::default(),
    };

    // Fill in previous epoch participation from the pre state's pending attestations
    translate_participation(&mut post, &pre.previous_epoch_attestations, epochs_ctx, ctx)?;

    // The current and next committee are the same at the fork boundary
    let sync_committee = get_next_sync_committee(&post, ctx)?;
    post.current_sync_committee = sync_committee.clone();
    post.next_sync_committee = sync_committee;

    info!(
        epoch,
        validators = validator_count,
        "Upgraded beacon state to altair"
    );
    Ok(post)
}
