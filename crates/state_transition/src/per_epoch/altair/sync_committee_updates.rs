use std::sync::Arc;

use ember_consensus_beacon::{altair::beacon_state::BeaconState, view::BeaconStateView};
use tracing::debug;

use crate::{
    common::sync_committee::get_next_sync_committee, context::TransitionContext,
    errors::EpochProcessingError,
};

/// At a sync committee period boundary the next committee takes over and a new next committee is
/// sampled.
pub fn process_sync_committee_updates(
    state: &mut BeaconState,
    ctx: &TransitionContext,
) -> Result<(), EpochProcessingError> {
    let next_epoch = state.get_current_epoch(ctx.spec) + 1;
    if next_epoch % ctx.spec.epochs_per_sync_committee_period == 0 {
        let next_sync_committee = get_next_sync_committee(state, ctx)?;
        state.current_sync_committee =
            std::mem::replace(&mut state.next_sync_committee, next_sync_committee);
        debug!(
            period = ctx.spec.compute_sync_committee_period(next_epoch),
            "Rotated sync committees"
        );
    }
    Ok(())
}
