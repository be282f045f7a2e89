//! Altair records attestations as participation flags and pays the proposer when the block
//! includes them. Blocks also carry a sync committee aggregate.

use ember_bls::PubKey;
use ember_consensus_beacon::{
    BeaconStateError,
    altair::{
        beacon_state::BeaconState,
        participation_flags::{add_flag, has_flag},
        sync_aggregate::SyncAggregate,
    },
    view::BeaconStateView,
};
use ember_consensus_misc::{
    attestation::Attestation,
    constants::{
        DOMAIN_SYNC_COMMITTEE, PARTICIPATION_FLAG_WEIGHTS, PROPOSER_WEIGHT, SYNC_COMMITTEE_SIZE,
        SYNC_REWARD_WEIGHT, WEIGHT_DENOMINATOR,
    },
    misc::compute_signing_root,
};

use super::{BlockProcessingState, verify_attestation};
use crate::{
    common::{
        altair::{BaseRewardPerIncrement, get_attestation_participation_flag_indices, get_base_reward},
        get_attesting_indices,
    },
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{
        AttestationInvalid, BlockOperationError, BlockProcessingError, IntoWithIndex,
        SyncAggregateInvalid,
    },
};

/// Validates each `Attestation` and sets the participation flags it earns, short-circuiting on an
/// invalid one.
pub fn process_attestations(
    state: &mut BeaconState,
    attestations: &[Attestation],
    proposer_index: u64,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockProcessingError> {
    // Effective balances are fixed within an epoch, so one total serves the whole block.
    let base_reward_per_increment =
        BaseRewardPerIncrement::new(state.get_total_active_balance(ctx.spec), ctx.spec);
    for (index, attestation) in attestations.iter().enumerate() {
        process_attestation(
            state,
            attestation,
            proposer_index,
            base_reward_per_increment,
            epochs_ctx,
            ctx,
        )
        .map_err(|err| err.into_with_index(index))?;
    }
    Ok(())
}

pub fn process_attestation(
    state: &mut BeaconState,
    attestation: &Attestation,
    proposer_index: u64,
    base_reward_per_increment: BaseRewardPerIncrement,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<AttestationInvalid>> {
    let spec = ctx.spec;
    let committee = verify_attestation(state, attestation, epochs_ctx, ctx)?;
    let data = &attestation.data;

    // Participation flag indices
    let participation_flag_indices =
        get_attestation_participation_flag_indices(state, data, state.slot - data.slot, spec)?;
    let attesting_indices = get_attesting_indices(committee, &attestation.aggregation_bits)
        .map_err(BlockOperationError::invalid)?;
    let is_current_epoch = data.target.epoch == state.get_current_epoch(spec);

    // Update epoch participation flags
    let mut proposer_reward_numerator = 0;
    for index in attesting_indices {
        let base_reward = get_base_reward(
            state.validator(index)?.effective_balance,
            base_reward_per_increment,
            spec,
        );
        let epoch_participation = if is_current_epoch {
            &mut state.current_epoch_participation
        } else {
            &mut state.previous_epoch_participation
        };
        let flags = epoch_participation
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))?;
        for (flag_index, weight) in PARTICIPATION_FLAG_WEIGHTS.iter().enumerate() {
            let flag_index = flag_index as u8;
            if participation_flag_indices.contains(&flag_index) && !has_flag(*flags, flag_index) {
                *flags = add_flag(*flags, flag_index);
                proposer_reward_numerator += base_reward * weight;
            }
        }
    }

    // Reward proposer
    let proposer_reward_denominator =
        (WEIGHT_DENOMINATOR - PROPOSER_WEIGHT) * WEIGHT_DENOMINATOR / PROPOSER_WEIGHT;
    state.increase_balance(
        proposer_index,
        proposer_reward_numerator / proposer_reward_denominator,
    )?;
    Ok(())
}

/// Verifies the sync committee signature over the previous slot's block root and settles the
/// committee's rewards and penalties for this slot.
pub fn process_sync_aggregate(
    state: &mut BeaconState,
    sync_aggregate: &SyncAggregate,
    proposer_index: u64,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<SyncAggregateInvalid>> {
    let spec = ctx.spec;

    // Verify sync committee aggregate signature signing over the previous slot block root
    let previous_slot = state.slot.max(1) - 1;
    let domain = state.get_domain(
        DOMAIN_SYNC_COMMITTEE,
        Some(spec.compute_epoch_at_slot(previous_slot)),
        spec,
    );
    let signing_root = compute_signing_root(&state.get_block_root_at_slot(previous_slot)?, domain);
    let participant_pubkeys = state
        .current_sync_committee
        .pubkeys
        .iter()
        .zip(sync_aggregate.sync_committee_bits.iter())
        .filter_map(|(pubkey, bit)| bit.then_some(pubkey))
        .collect::<Vec<&PubKey>>();
    let signature = &sync_aggregate.sync_committee_signature;
    // With no participants only the point at infinity is accepted.
    let is_valid_signature = if participant_pubkeys.is_empty() {
        signature.is_infinity()
    } else {
        ctx.verifier
            .fast_aggregate_verify(&participant_pubkeys, signing_root.as_slice(), signature)
    };
    verify!(is_valid_signature, SyncAggregateInvalid::SignatureInvalid);

    // Compute participant and proposer rewards
    let total_active_balance = state.get_total_active_balance(spec);
    let total_active_increments = total_active_balance / spec.effective_balance_increment;
    let total_base_rewards =
        BaseRewardPerIncrement::new(total_active_balance, spec).as_u64() * total_active_increments;
    let max_participant_rewards =
        total_base_rewards * SYNC_REWARD_WEIGHT / WEIGHT_DENOMINATOR / spec.slots_per_epoch;
    let participant_reward = max_participant_rewards / SYNC_COMMITTEE_SIZE;
    let proposer_reward =
        participant_reward * PROPOSER_WEIGHT / (WEIGHT_DENOMINATOR - PROPOSER_WEIGHT);

    // Apply participant and proposer rewards
    let committee_indices = state
        .current_sync_committee
        .pubkeys
        .iter()
        .map(|pubkey| {
            epochs_ctx
                .pubkey_cache
                .get_index(pubkey)
                .ok_or(BlockOperationError::invalid(SyncAggregateInvalid::UnknownMember))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for (participant_index, participation_bit) in committee_indices
        .into_iter()
        .zip(sync_aggregate.sync_committee_bits.iter())
    {
        if participation_bit {
            state.increase_balance(participant_index, participant_reward)?;
            state.increase_balance(proposer_index, proposer_reward)?;
        } else {
            state.decrease_balance(participant_index, participant_reward)?;
        }
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

    fn process_sync_aggregate(
        &mut self,
        sync_aggregate: Option<&SyncAggregate>,
        proposer_index: u64,
        epochs_ctx: &EpochsContext,
        ctx: &TransitionContext,
    ) -> Result<(), BlockProcessingError> {
        match sync_aggregate {
            Some(sync_aggregate) => {
                process_sync_aggregate(self, sync_aggregate, proposer_index, epochs_ctx, ctx)?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}
