//! The epoch transition, run at the last slot of every epoch.
//!
//! Stages run in a fixed order and each one may read what the previous one wrote. Both forks
//! share the registry, slashing and reset stages; participation accounting differs and lives in
//! [`base`] (pending attestations) and [`altair`] (participation flags).

pub mod altair;
pub mod base;
mod deltas;
mod epoch_processing_summary;
pub mod justification_and_finalization;
pub mod registry_updates;
pub mod resets;
pub mod slashings;

pub use deltas::Deltas;
pub use epoch_processing_summary::EpochProcessingSummary;
use ember_consensus_beacon::ForkedBeaconState;
use tracing::debug;

use crate::{context::TransitionContext, epoch_context::EpochsContext, errors::EpochProcessingError};

/// Runs the epoch transition for whichever fork `state` is at.
///
/// On error the state may be partially processed and must be discarded.
pub fn process_epoch(
    state: &mut ForkedBeaconState,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<EpochProcessingSummary, EpochProcessingError> {
    let summary = match state {
        ForkedBeaconState::Phase0(state) => base::process_epoch(state, epochs_ctx, ctx)?,
        ForkedBeaconState::Altair(state) => altair::process_epoch(state, ctx)?,
    };
    debug!(
        epoch = summary.epoch,
        justified_epoch = summary.current_justified_checkpoint.epoch,
        finalized_epoch = summary.finalized_checkpoint.epoch,
        total_active_balance = summary.total_active_balance,
        "Processed epoch"
    );
    Ok(summary)
}
