//! The beacon chain state transition: slot, epoch and block processing for the phase0 and altair
//! forks.
//!
//! Callers hold a [`ForkedBeaconState`](ember_consensus_beacon::ForkedBeaconState) together with
//! an [`EpochsContext`] built from it, and drive both through [`state_transition`] or
//! [`process_slots`]. Protocol parameters, signature verification and cancellation come in
//! through a [`TransitionContext`].

pub mod common;
pub mod context;
pub mod epoch_context;
pub mod errors;
pub mod genesis;
pub mod per_block;
pub mod per_epoch;
pub mod per_slot;
pub mod transition;
pub mod upgrade;

#[cfg(test)]
mod test_utils;

pub use context::TransitionContext;
pub use epoch_context::{EpochsContext, PubkeyCache};
pub use errors::StateTransitionError;
pub use genesis::{initialize_beacon_state_from_eth1, is_valid_genesis_state};
pub use per_block::{process_block, process_forked_block};
pub use per_epoch::{EpochProcessingSummary, process_epoch};
pub use per_slot::{process_slot, process_slots};
pub use transition::{state_transition, verify_block_signature};
pub use upgrade::upgrade_to_altair;
