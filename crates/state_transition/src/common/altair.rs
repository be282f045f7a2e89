//! Altair reward arithmetic and attestation timeliness.

use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::{
    attestation_data::AttestationData,
    constants::{TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX},
    misc::integer_squareroot,
};
use ember_network_spec::ChainSpec;

use crate::errors::{AttestationInvalid, BlockOperationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseRewardPerIncrement(u64);

impl BaseRewardPerIncrement {
    pub fn new(total_active_balance: u64, spec: &ChainSpec) -> Self {
        let sqrt = integer_squareroot(total_active_balance);
        if sqrt == 0 {
            return Self(0);
        }
        Self(spec.effective_balance_increment * spec.base_reward_factor / sqrt)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Base reward of a validator with `effective_balance`, quantized to whole increments.
pub fn get_base_reward(
    effective_balance: u64,
    base_reward_per_increment: BaseRewardPerIncrement,
    spec: &ChainSpec,
) -> u64 {
    effective_balance / spec.effective_balance_increment * base_reward_per_increment.0
}

/// Return the flag indices that are satisfied by an attestation.
///
/// The source must match the justified checkpoint of the target's epoch, otherwise the
/// attestation is invalid.
pub fn get_attestation_participation_flag_indices<S: BeaconStateView>(
    state: &S,
    data: &AttestationData,
    inclusion_delay: u64,
    spec: &ChainSpec,
) -> Result<Vec<u8>, BlockOperationError<AttestationInvalid>> {
    let justified_checkpoint = if data.target.epoch == state.get_current_epoch(spec) {
        state.current_justified_checkpoint()
    } else {
        state.previous_justified_checkpoint()
    };

    // Matching roots
    if data.source != *justified_checkpoint {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::WrongJustifiedCheckpoint,
        ));
    }
    let is_matching_target = data.target.root == state.get_block_root(data.target.epoch, spec)?;
    let is_matching_head =
        is_matching_target && data.beacon_block_root == state.get_block_root_at_slot(data.slot)?;

    let mut participation_flag_indices = vec![];
    if inclusion_delay <= integer_squareroot(spec.slots_per_epoch) {
        participation_flag_indices.push(TIMELY_SOURCE_FLAG_INDEX);
    }
    if is_matching_target && inclusion_delay <= spec.slots_per_epoch {
        participation_flag_indices.push(TIMELY_TARGET_FLAG_INDEX);
    }
    if is_matching_head && inclusion_delay == spec.min_attestation_inclusion_delay {
        participation_flag_indices.push(TIMELY_HEAD_FLAG_INDEX);
    }
    Ok(participation_flag_indices)
}
