//! Bookkeeping stages at the tail of the epoch transition. Each one rolls a per-epoch accumulator
//! forward for the epoch about to start.

use ember_consensus_beacon::view::{BeaconStateView, ParticipationView, PendingAttestationsView};
use ember_consensus_misc::{
    constants::{EPOCHS_PER_HISTORICAL_VECTOR, SLOTS_PER_HISTORICAL_ROOT},
    historical_batch::HistoricalBatch,
};
use ember_network_spec::ChainSpec;
use ssz_types::VariableList;
use tree_hash::TreeHash;

use crate::{context::TransitionContext, errors::EpochProcessingError};

/// Clears the eth1 vote list at the end of each voting period.
pub fn process_eth1_data_reset<S: BeaconStateView>(state: &mut S, spec: &ChainSpec) {
    let next_epoch = state.get_current_epoch(spec) + 1;
    if next_epoch % spec.epochs_per_eth1_voting_period == 0 {
        *state.eth1_data_votes_mut() = VariableList::default();
    }
}

/// Moves each effective balance towards the actual balance, only once the difference exceeds
/// the hysteresis thresholds.
pub fn process_effective_balance_updates<S: BeaconStateView>(
    state: &mut S,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let spec = ctx.spec;
    let hysteresis_increment = spec.effective_balance_increment / spec.hysteresis_quotient;
    let downward_threshold = hysteresis_increment * spec.hysteresis_downward_multiplier;
    let upward_threshold = hysteresis_increment * spec.hysteresis_upward_multiplier;

    for index in 0..state.validators().len() {
        ctx.check_cancelled_at(index)?;
        let balance = state.balance(index as u64)?;
        let validator = state.validator_mut(index as u64)?;
        if balance + downward_threshold < validator.effective_balance
            || validator.effective_balance + upward_threshold < balance
        {
            validator.effective_balance = (balance - balance % spec.effective_balance_increment)
                .min(spec.max_effective_balance);
        }
    }
    Ok(())
}

/// Zeroes the slashings slot the next epoch will accumulate into.
pub fn process_slashings_reset<S: BeaconStateView>(state: &mut S, spec: &ChainSpec) {
    let next_epoch = state.get_current_epoch(spec) + 1;
    let index = state.slashings_index(next_epoch);
    state.slashings_mut()[index] = 0;
}

/// Seeds the next epoch's randao mix with the current one.
pub fn process_randao_mixes_reset<S: BeaconStateView>(state: &mut S, spec: &ChainSpec) {
    let current_epoch = state.get_current_epoch(spec);
    let next_epoch = current_epoch + 1;
    let mix = state.get_randao_mix(current_epoch);
    state.randao_mixes_mut()[(next_epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize] = mix;
}

/// Appends the root of the block and state root vectors once they have been fully overwritten.
pub fn process_historical_roots_update<S: BeaconStateView>(
    state: &mut S,
    spec: &ChainSpec,
) -> Result<(), EpochProcessingError> {
    let next_epoch = state.get_current_epoch(spec) + 1;
    if next_epoch % (SLOTS_PER_HISTORICAL_ROOT / spec.slots_per_epoch) == 0 {
        let historical_batch = HistoricalBatch {
            block_roots: state.block_roots().clone(),
            state_roots: state.state_roots().clone(),
        };
        state
            .historical_roots_mut()
            .push(historical_batch.tree_hash_root())
            .map_err(|_| EpochProcessingError::HistoricalRootsFull)?;
    }
    Ok(())
}

/// Phase0: the current epoch's pending attestations become the previous epoch's.
pub fn process_participation_record_updates<S: PendingAttestationsView>(state: &mut S) {
    *state.previous_epoch_attestations_mut() =
        std::mem::take(state.current_epoch_attestations_mut());
}

/// Altair: the current epoch's flags become the previous epoch's and every validator starts the
/// next epoch with no flags set.
pub fn process_participation_flag_updates<S: ParticipationView>(state: &mut S) {
    let validator_count = state.validators().len();
    *state.previous_epoch_participation_mut() = std::mem::replace(
        state.current_epoch_participation_mut(),
        VariableList::from(vec![0; validator_count]),
    );
}
