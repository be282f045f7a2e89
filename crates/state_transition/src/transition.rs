use ember_consensus_beacon::{
    ForkedBeaconState, ForkedSignedBeaconBlock, map_forked_state, view::BeaconStateView,
};
use ember_consensus_misc::{constants::DOMAIN_BEACON_PROPOSER, misc::compute_signing_root};

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{EpochContextError, StateTransitionError},
    per_block::process_forked_block,
    per_slot::process_slots,
};

/// Advances `state` to the block's slot and applies the block.
///
/// With `validate_result` the proposer signature and the declared state root are checked as
/// well. The work happens on copies of `state` and `epochs_ctx`, which replace the originals only
/// when every step succeeds.
pub fn state_transition(
    state: &mut ForkedBeaconState,
    epochs_ctx: &mut EpochsContext,
    signed_block: &ForkedSignedBeaconBlock,
    validate_result: bool,
    ctx: &TransitionContext,
) -> Result<(), StateTransitionError> {
    let mut post = state.clone();
    let mut post_epochs_ctx = epochs_ctx.clone();

    // Process slots (including those with no blocks) since block
    process_slots(&mut post, &mut post_epochs_ctx, signed_block.slot(), ctx)?;
    if post.fork_name() != signed_block.fork_name() {
        return Err(StateTransitionError::ForkMismatch {
            block: signed_block.fork_name(),
            state: post.fork_name(),
        });
    }

    // Verify signature
    if validate_result && !verify_block_signature(&post, signed_block, &post_epochs_ctx, ctx)? {
        return Err(StateTransitionError::BlockSignatureInvalid);
    }

    // Process block
    process_forked_block(&mut post, signed_block, &mut post_epochs_ctx, ctx)?;
    ctx.check_cancelled()?;

    // Verify state root
    if validate_result {
        let computed = post.state_root();
        let expected = signed_block.state_root();
        if computed != expected {
            return Err(StateTransitionError::StateRootMismatch { expected, computed });
        }
    }

    *state = post;
    *epochs_ctx = post_epochs_ctx;
    Ok(())
}

/// Checks the proposer's signature over the block, under the state's current fork domain.
pub fn verify_block_signature(
    state: &ForkedBeaconState,
    signed_block: &ForkedSignedBeaconBlock,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<bool, EpochContextError> {
    let proposer_index = signed_block.proposer_index();
    let pubkey = epochs_ctx
        .pubkey_cache
        .get_pubkey(proposer_index)
        .ok_or(EpochContextError::MissingPubkey(proposer_index))?;
    let domain = map_forked_state!(state, |inner| inner.get_domain(
        DOMAIN_BEACON_PROPOSER,
        None,
        ctx.spec
    ));
    let signing_root = compute_signing_root(&signed_block.message_root(), domain);
    Ok(ctx
        .verifier
        .verify(&pubkey, signing_root.as_slice(), signed_block.signature()))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ember_bls::{BLSSignature, FakeVerifier};
    use ember_consensus_beacon::phase0::beacon_block::{BeaconBlock, SignedBeaconBlock};
    use ember_consensus_misc::fork::ForkName;
    use ember_network_spec::MINIMAL;
    use tree_hash::TreeHash;

    use super::*;
    use crate::{errors::BlockProcessingError, test_utils::phase0_state};

    /// An empty block at `slot` that is valid on top of `state`, with its state root filled in.
    fn empty_block(
        state: &ForkedBeaconState,
        epochs_ctx: &EpochsContext,
        slot: u64,
        ctx: &TransitionContext,
    ) -> ForkedSignedBeaconBlock {
        let mut pre = state.clone();
        let mut pre_epochs_ctx = epochs_ctx.clone();
        process_slots(&mut pre, &mut pre_epochs_ctx, slot, ctx).unwrap();
        let mut block = BeaconBlock {
            slot,
            proposer_index: pre_epochs_ctx.get_beacon_proposer(slot).unwrap(),
            parent_root: pre.as_phase0().unwrap().latest_block_header.tree_hash_root(),
            ..Default::default()
        };
        block.body.randao_reveal = BLSSignature::infinity();
        block.body.eth1_data = pre.as_phase0().unwrap().eth1_data.clone();

        let sign = |message| {
            ForkedSignedBeaconBlock::from(SignedBeaconBlock {
                message,
                signature: BLSSignature::infinity(),
            })
        };
        process_forked_block(&mut pre, &sign(block.clone()), &mut pre_epochs_ctx, ctx).unwrap();
        block.state_root = pre.state_root();
        sign(block)
    }

    #[test]
    fn test_valid_block_is_applied() {
        let mut state = ForkedBeaconState::from(phase0_state(64, 0));
        let mut epochs_ctx = EpochsContext::new(state.as_phase0().unwrap(), &MINIMAL).unwrap();
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&MINIMAL, &verifier);

        let block = empty_block(&state, &epochs_ctx, 3, &ctx);
        state_transition(&mut state, &mut epochs_ctx, &block, true, &ctx).unwrap();
        assert_eq!(state.slot(), 3);
        assert_eq!(state.state_root(), block.state_root());
    }

    #[test]
    fn test_failed_block_leaves_state_untouched() {
        let mut state = ForkedBeaconState::from(phase0_state(64, 0));
        let mut epochs_ctx = EpochsContext::new(state.as_phase0().unwrap(), &MINIMAL).unwrap();
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&MINIMAL, &verifier);
        let original = state.clone();

        let block = empty_block(&state, &epochs_ctx, 3, &ctx);
        let ForkedSignedBeaconBlock::Phase0(mut wrong_root) = block.clone() else {
            unreachable!()
        };
        wrong_root.message.state_root = B256::repeat_byte(1);
        let result = state_transition(
            &mut state,
            &mut epochs_ctx,
            &wrong_root.clone().into(),
            true,
            &ctx,
        );
        assert!(matches!(
            result,
            Err(StateTransitionError::StateRootMismatch { .. })
        ));
        assert_eq!(state, original);

        // Without validation the declared root is not checked.
        state_transition(&mut state, &mut epochs_ctx, &wrong_root.into(), false, &ctx).unwrap();
        assert_eq!(state.slot(), 3);

        let bad_signature = FakeVerifier { valid: false };
        let ctx = TransitionContext::new(&MINIMAL, &bad_signature);
        let mut state = original.clone();
        let mut epochs_ctx = EpochsContext::new(state.as_phase0().unwrap(), &MINIMAL).unwrap();
        assert_eq!(
            state_transition(&mut state, &mut epochs_ctx, &block, true, &ctx),
            Err(StateTransitionError::BlockSignatureInvalid)
        );
        // The randao reveal is checked even when the result is not validated.
        assert_eq!(
            state_transition(&mut state, &mut epochs_ctx, &block, false, &ctx),
            Err(StateTransitionError::BlockProcessing(
                BlockProcessingError::RandaoSignatureInvalid
            ))
        );
        assert_eq!(state, original);
    }

    #[test]
    fn test_block_must_match_state_fork() {
        let mut state = ForkedBeaconState::from(phase0_state(64, 0));
        let mut epochs_ctx = EpochsContext::new(state.as_phase0().unwrap(), &MINIMAL).unwrap();
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&MINIMAL, &verifier);

        let block = ForkedSignedBeaconBlock::from(
            ember_consensus_beacon::altair::beacon_block::SignedBeaconBlock {
                message: ember_consensus_beacon::altair::beacon_block::BeaconBlock {
                    slot: 1,
                    ..Default::default()
                },
                signature: BLSSignature::infinity(),
            },
        );
        assert_eq!(
            state_transition(&mut state, &mut epochs_ctx, &block, true, &ctx),
            Err(StateTransitionError::ForkMismatch {
                block: ForkName::Altair,
                state: ForkName::Phase0,
            })
        );
    }
}
