//! Altair epoch processing. Participation is read from the per-validator flag bytes instead of
//! stored attestations, and missed targets accrue an inactivity score.

pub mod inactivity_updates;
pub mod participation_cache;
pub mod rewards_and_penalties;
pub mod sync_committee_updates;

use ember_consensus_beacon::{altair::beacon_state::BeaconState, view::BeaconStateView};
use ember_consensus_misc::constants::{
    GENESIS_EPOCH, TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX,
};
pub use inactivity_updates::process_inactivity_updates;
pub use participation_cache::ParticipationCache;
pub use rewards_and_penalties::process_rewards_and_penalties;
pub use sync_committee_updates::process_sync_committee_updates;

use super::{
    EpochProcessingSummary,
    justification_and_finalization::process_justification_and_finalization,
    registry_updates::process_registry_updates,
    resets::{
        process_effective_balance_updates, process_eth1_data_reset,
        process_historical_roots_update, process_participation_flag_updates,
        process_randao_mixes_reset, process_slashings_reset,
    },
    slashings::process_slashings,
};
use crate::{context::TransitionContext, errors::EpochProcessingError};

pub fn process_epoch(
    state: &mut BeaconState,
    ctx: &TransitionContext,
) -> Result<EpochProcessingSummary, EpochProcessingError> {
    let spec = ctx.spec;
    let current_epoch = state.get_current_epoch(spec);

    // Pre-compute participating indices and total balances.
    let participation_cache = ParticipationCache::new(state, ctx)?;
    let total_active_balance = participation_cache.current_epoch_total_active_balance();
    ctx.check_cancelled()?;

    process_justification_and_finalization(
        state,
        total_active_balance,
        participation_cache.previous_epoch_target_attesting_balance(),
        participation_cache.current_epoch_target_attesting_balance(),
        spec,
    )?;
    ctx.check_cancelled()?;

    process_inactivity_updates(state, &participation_cache, ctx)?;
    ctx.check_cancelled()?;

    // No previous epoch to reward at genesis.
    if current_epoch != GENESIS_EPOCH {
        process_rewards_and_penalties(state, &participation_cache, ctx)?;
        ctx.check_cancelled()?;
    }

    process_registry_updates(state, ctx)?;
    ctx.check_cancelled()?;
    process_slashings(state, total_active_balance, ctx)?;
    ctx.check_cancelled()?;

    process_eth1_data_reset(state, spec);
    process_effective_balance_updates(state, ctx)?;
    process_slashings_reset(state, spec);
    process_randao_mixes_reset(state, spec);
    process_historical_roots_update(state, spec)?;
    process_participation_flag_updates(state);
    process_sync_committee_updates(state, ctx)?;

    Ok(EpochProcessingSummary {
        epoch: current_epoch,
        total_active_balance,
        previous_epoch_source_attesting_balance: participation_cache
            .previous_epoch_flag_attesting_balance(TIMELY_SOURCE_FLAG_INDEX),
        previous_epoch_target_attesting_balance: participation_cache
            .previous_epoch_target_attesting_balance(),
        previous_epoch_head_attesting_balance: participation_cache
            .previous_epoch_flag_attesting_balance(TIMELY_HEAD_FLAG_INDEX),
        current_epoch_target_attesting_balance: participation_cache
            .current_epoch_target_attesting_balance(),
        current_justified_checkpoint: state.current_justified_checkpoint,
        finalized_checkpoint: state.finalized_checkpoint,
    })
}
