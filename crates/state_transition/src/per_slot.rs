use alloy_primitives::B256;
use ember_consensus_beacon::{ForkedBeaconState, map_forked_state, view::BeaconStateView};
use ember_consensus_misc::constants::SLOTS_PER_HISTORICAL_ROOT;
use tree_hash::TreeHash;

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::SlotProcessingError,
    per_epoch::{EpochProcessingSummary, process_epoch},
    upgrade::upgrade_to_altair,
};

/// Caches the roots of the state and block at the current slot before the slot advances.
pub fn process_slot<S: BeaconStateView>(state: &mut S) {
    let index = (state.slot() % SLOTS_PER_HISTORICAL_ROOT) as usize;

    // Cache state root
    let previous_state_root = state.tree_hash_root();
    state.state_roots_mut()[index] = previous_state_root;
    // Cache latest block header state root
    if state.latest_block_header().state_root == B256::ZERO {
        state.latest_block_header_mut().state_root = previous_state_root;
    }
    // Cache block root
    let previous_block_root = state.latest_block_header().tree_hash_root();
    state.block_roots_mut()[index] = previous_block_root;
}

/// Advances `state` to `slot`, running the epoch transition at the end of every epoch and the
/// altair upgrade when its fork epoch begins. `epochs_ctx` is rotated at each epoch boundary.
///
/// Returns the summaries of the epoch transitions that ran, oldest first.
pub fn process_slots(
    state: &mut ForkedBeaconState,
    epochs_ctx: &mut EpochsContext,
    slot: u64,
    ctx: &TransitionContext,
) -> Result<Vec<EpochProcessingSummary>, SlotProcessingError> {
    let spec = ctx.spec;
    if state.slot() >= slot {
        return Err(SlotProcessingError::SlotNotIncreasing {
            target: slot,
            current: state.slot(),
        });
    }

    let mut summaries = vec![];
    while state.slot() < slot {
        ctx.check_cancelled()?;
        map_forked_state!(&mut *state, |inner| process_slot(inner));
        // Process epoch on the last slot of the epoch
        if (state.slot() + 1) % spec.slots_per_epoch == 0 {
            summaries.push(process_epoch(state, epochs_ctx, ctx)?);
        }
        map_forked_state!(&mut *state, |inner| *inner.slot_mut() += 1);

        if state.slot() % spec.slots_per_epoch == 0 {
            map_forked_state!(&*state, |inner| epochs_ctx.rotate(inner, spec))?;
            let epoch = spec.compute_epoch_at_slot(state.slot());
            if epoch == spec.altair_fork_epoch {
                if let ForkedBeaconState::Phase0(pre) = state {
                    let post = upgrade_to_altair(pre, epochs_ctx, ctx)?;
                    *state = post.into();
                }
            }
        }
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use ember_bls::FakeVerifier;
    use ember_consensus_misc::fork::ForkName;
    use ember_network_spec::{ChainSpec, MINIMAL};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::test_utils::{altair_state, phase0_state};

    #[test]
    fn test_process_slot_fills_header_state_root() {
        let mut state = phase0_state(8, 3);
        process_slot(&mut state);

        let state_root = state.state_roots[3];
        assert_ne!(state_root, B256::ZERO);
        assert_eq!(state.latest_block_header.state_root, state_root);
        assert_eq!(
            state.block_roots[3],
            state.latest_block_header.tree_hash_root()
        );

        // A header that already carries its state root is left alone.
        process_slot(&mut state);
        assert_eq!(state.latest_block_header.state_root, state_root);
    }

    #[test]
    fn test_process_slots_runs_epochs_and_rotates_context() {
        let mut state = ForkedBeaconState::from(phase0_state(64, 0));
        let mut epochs_ctx = map_forked_state!(&state, |inner| EpochsContext::new(
            inner, &MINIMAL
        ))
        .unwrap();
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&MINIMAL, &verifier);

        let summaries = process_slots(&mut state, &mut epochs_ctx, 17, &ctx).unwrap();
        assert_eq!(state.slot(), 17);
        assert_eq!(
            summaries
                .iter()
                .map(|summary| summary.epoch)
                .collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(epochs_ctx.epoch(), 2);

        assert_eq!(
            process_slots(&mut state, &mut epochs_ctx, 17, &ctx),
            Err(SlotProcessingError::SlotNotIncreasing {
                target: 17,
                current: 17
            })
        );
    }

    #[test]
    fn test_process_slots_upgrades_at_fork_epoch() {
        let spec = ChainSpec {
            altair_fork_epoch: 1,
            ..MINIMAL.as_ref().clone()
        };
        let mut state = ForkedBeaconState::from(phase0_state(64, 0));
        let mut epochs_ctx =
            map_forked_state!(&state, |inner| EpochsContext::new(inner, &spec)).unwrap();
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&spec, &verifier);

        process_slots(&mut state, &mut epochs_ctx, 7, &ctx).unwrap();
        assert_eq!(state.fork_name(), ForkName::Phase0);
        let phase0_version = state.as_phase0().unwrap().fork.current_version;
        process_slots(&mut state, &mut epochs_ctx, 8, &ctx).unwrap();
        assert_eq!(state.fork_name(), ForkName::Altair);

        let state = state.as_altair().unwrap();
        assert_eq!(state.fork.current_version, spec.altair_fork_version);
        assert_eq!(state.fork.previous_version, phase0_version);
        assert_eq!(state.fork.epoch, 1);
        assert_eq!(state.inactivity_scores.len(), 64);
    }

    #[test]
    fn test_cancelled_token_stops_slot_processing() {
        let mut state = ForkedBeaconState::from(altair_state(16, 0));
        let mut epochs_ctx = map_forked_state!(&state, |inner| EpochsContext::new(
            inner, &MINIMAL
        ))
        .unwrap();
        let verifier = FakeVerifier::default();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = TransitionContext::new(&MINIMAL, &verifier).with_cancellation(&token);

        assert_eq!(
            process_slots(&mut state, &mut epochs_ctx, 20, &ctx),
            Err(SlotProcessingError::Cancelled)
        );
        assert_eq!(state.slot(), 0);
    }
}
