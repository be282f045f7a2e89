//! Block processing: header, randao, eth1 vote, operations, and from altair the sync aggregate.
//!
//! Stages are fail-fast. A block either applies completely or the state it was applied to must be
//! discarded, which is what [`crate::transition::state_transition`] does by working on a copy.

#[macro_use]
mod macros;

pub mod altair;
pub mod base;
mod process_operations;
mod verify_attestation;
mod verify_attester_slashing;
mod verify_deposit;
mod verify_exit;
mod verify_proposer_slashing;

use alloy_primitives::B256;
use ember_consensus_beacon::{
    BeaconStateError, ForkedBeaconState, ForkedSignedBeaconBlock,
    altair::sync_aggregate::SyncAggregate,
    block::{BeaconBlockBodyView, BeaconBlockView},
    view::BeaconStateView,
};
use ember_consensus_misc::{
    attestation::Attestation,
    beacon_block_header::BeaconBlockHeader,
    constants::{DOMAIN_RANDAO, EPOCHS_PER_HISTORICAL_VECTOR},
    eth_1_data::Eth1Data,
    misc::{compute_signing_root, xor},
};
use ember_network_spec::ChainSpec;
use ethereum_hashing::hash;
pub use process_operations::{
    apply_deposit, process_attester_slashing, process_deposit, process_operations,
    process_proposer_slashing, process_voluntary_exit,
};
use tree_hash::TreeHash;
pub use verify_attestation::verify_attestation;
pub use verify_attester_slashing::{get_slashable_indices, verify_attester_slashing};
pub use verify_deposit::{
    get_existing_validator_index, verify_deposit_merkle_proof, verify_deposit_signature,
};
pub use verify_exit::verify_exit;
pub use verify_proposer_slashing::verify_proposer_slashing;

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{BlockOperationError, BlockProcessingError, EpochContextError, HeaderInvalid},
};

/// The block stages whose rules differ between forks.
pub trait BlockProcessingState: BeaconStateView {
    fn process_attestations(
        &mut self,
        attestations: &[Attestation],
        proposer_index: u64,
        epochs_ctx: &EpochsContext,
        ctx: &TransitionContext,
    ) -> Result<(), BlockProcessingError>;

    fn process_sync_aggregate(
        &mut self,
        sync_aggregate: Option<&SyncAggregate>,
        proposer_index: u64,
        epochs_ctx: &EpochsContext,
        ctx: &TransitionContext,
    ) -> Result<(), BlockProcessingError>;
}

/// Applies `block` to a state of the same fork. The state must already be at the block's slot.
pub fn process_forked_block(
    state: &mut ForkedBeaconState,
    block: &ForkedSignedBeaconBlock,
    epochs_ctx: &mut EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockProcessingError> {
    match (state, block) {
        (ForkedBeaconState::Phase0(state), ForkedSignedBeaconBlock::Phase0(block)) => {
            process_block(state, &block.message, epochs_ctx, ctx)
        }
        (ForkedBeaconState::Altair(state), ForkedSignedBeaconBlock::Altair(block)) => {
            process_block(state, &block.message, epochs_ctx, ctx)
        }
        (state, block) => Err(BeaconStateError::WrongFork {
            expected: state.fork_name(),
            actual: block.fork_name(),
        }
        .into()),
    }
}

pub fn process_block<S: BlockProcessingState, B: BeaconBlockView>(
    state: &mut S,
    block: &B,
    epochs_ctx: &mut EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockProcessingError> {
    let proposer_index = process_block_header(state, block, epochs_ctx)?;
    ctx.check_cancelled()?;

    let body = block.body();
    process_randao(state, body, proposer_index, epochs_ctx, ctx)?;
    process_eth1_data(state, body.eth1_data(), ctx.spec)?;
    process_operations(state, body, proposer_index, epochs_ctx, ctx)?;
    ctx.check_cancelled()?;

    state.process_sync_aggregate(body.sync_aggregate(), proposer_index, epochs_ctx, ctx)
}

/// Checks the block against the latest header and caches it as the new latest header. Returns
/// the proposer index.
pub fn process_block_header<S: BeaconStateView, B: BeaconBlockView>(
    state: &mut S,
    block: &B,
    epochs_ctx: &EpochsContext,
) -> Result<u64, BlockOperationError<HeaderInvalid>> {
    // Verify that the slots match
    verify!(
        block.slot() == state.slot(),
        HeaderInvalid::StateSlotMismatch {
            block_slot: block.slot(),
            state_slot: state.slot(),
        }
    );
    // Verify that the block is newer than latest block header
    let latest_slot = state.latest_block_header().slot;
    verify!(
        block.slot() > latest_slot,
        HeaderInvalid::OlderThanLatestBlockHeader {
            block_slot: block.slot(),
            latest_slot,
        }
    );
    // Verify that proposer index is the correct index
    let proposer_index = epochs_ctx.get_beacon_proposer(block.slot())?;
    verify!(
        block.proposer_index() == proposer_index,
        HeaderInvalid::ProposerIndexMismatch {
            block_proposer_index: block.proposer_index(),
            state_proposer_index: proposer_index,
        }
    );
    // Verify that the parent matches
    let expected_parent_root = state.latest_block_header().tree_hash_root();
    verify!(
        block.parent_root() == expected_parent_root,
        HeaderInvalid::ParentBlockRootMismatch {
            state: expected_parent_root,
            block: block.parent_root(),
        }
    );

    // Cache current block as the new latest block, the state root is filled in by the next
    // `process_slot`
    *state.latest_block_header_mut() = BeaconBlockHeader {
        state_root: B256::ZERO,
        ..block.block_header()
    };

    // Verify proposer is not slashed
    verify!(
        !state.validator(proposer_index)?.slashed,
        HeaderInvalid::ProposerSlashed(proposer_index)
    );
    Ok(proposer_index)
}

pub fn process_randao<S: BeaconStateView, Body: BeaconBlockBodyView>(
    state: &mut S,
    body: &Body,
    proposer_index: u64,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockProcessingError> {
    let spec = ctx.spec;
    let epoch = state.get_current_epoch(spec);

    // Verify RANDAO reveal
    let proposer_pubkey = epochs_ctx
        .pubkey_cache
        .get_pubkey(proposer_index)
        .ok_or(EpochContextError::MissingPubkey(proposer_index))?;
    let signing_root =
        compute_signing_root(&epoch, state.get_domain(DOMAIN_RANDAO, Some(epoch), spec));
    if !ctx.verifier.verify(
        &proposer_pubkey,
        signing_root.as_slice(),
        body.randao_reveal(),
    ) {
        return Err(BlockProcessingError::RandaoSignatureInvalid);
    }

    // Mix in RANDAO reveal
    let mix = xor(
        state.get_randao_mix(epoch).as_slice(),
        hash(body.randao_reveal().to_bytes()).as_slice(),
    );
    state.randao_mixes_mut()[(epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize] = mix;
    Ok(())
}

/// Records the block's eth1 vote and adopts it once it holds a majority of the voting period.
pub fn process_eth1_data<S: BeaconStateView>(
    state: &mut S,
    eth1_data: &Eth1Data,
    spec: &ChainSpec,
) -> Result<(), BlockProcessingError> {
    state
        .eth1_data_votes_mut()
        .push(eth1_data.clone())
        .map_err(|_| BlockProcessingError::Eth1DataVotesFull)?;

    let voting_period = spec.slots_per_eth1_voting_period();
    let votes = state.eth1_data_votes();
    // No vote can hold a majority before half of the period has voted.
    if votes.len() as u64 * 2 <= voting_period {
        return Ok(());
    }
    let count = votes.iter().filter(|vote| *vote == eth1_data).count() as u64;
    if count * 2 > voting_period {
        *state.eth1_data_mut() = eth1_data.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ember_bls::{BLSSignature, FakeVerifier};
    use ember_consensus_beacon::phase0::beacon_block::{BeaconBlock, BeaconBlockBody};
    use ember_network_spec::MINIMAL;

    use super::*;
    use crate::test_utils::phase0_state;

    fn block_for(
        state: &ember_consensus_beacon::phase0::beacon_state::BeaconState,
        epochs_ctx: &EpochsContext,
    ) -> BeaconBlock {
        BeaconBlock {
            slot: state.slot,
            proposer_index: epochs_ctx.get_beacon_proposer(state.slot).unwrap(),
            parent_root: state.latest_block_header.tree_hash_root(),
            state_root: B256::repeat_byte(0xaa),
            body: BeaconBlockBody::default(),
        }
    }

    #[test]
    fn test_block_header_is_cached_without_state_root() {
        let mut state = phase0_state(16, 1);
        let epochs_ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        let block = block_for(&state, &epochs_ctx);

        let proposer_index = process_block_header(&mut state, &block, &epochs_ctx).unwrap();
        assert_eq!(proposer_index, block.proposer_index);
        assert_eq!(state.latest_block_header.slot, 1);
        assert_eq!(state.latest_block_header.state_root, B256::ZERO);
        assert_eq!(
            state.latest_block_header.body_root,
            block.body.tree_hash_root()
        );
    }

    #[test]
    fn test_block_header_rejections() {
        let state = phase0_state(16, 1);
        let epochs_ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        let valid = block_for(&state, &epochs_ctx);

        let wrong_slot = BeaconBlock {
            slot: 2,
            ..valid.clone()
        };
        assert_eq!(
            process_block_header(&mut state.clone(), &wrong_slot, &epochs_ctx),
            Err(BlockOperationError::Invalid(
                HeaderInvalid::StateSlotMismatch {
                    block_slot: 2,
                    state_slot: 1
                }
            ))
        );

        let wrong_proposer = BeaconBlock {
            proposer_index: (valid.proposer_index + 1) % 16,
            ..valid.clone()
        };
        assert!(matches!(
            process_block_header(&mut state.clone(), &wrong_proposer, &epochs_ctx),
            Err(BlockOperationError::Invalid(
                HeaderInvalid::ProposerIndexMismatch { .. }
            ))
        ));

        let wrong_parent = BeaconBlock {
            parent_root: B256::repeat_byte(1),
            ..valid.clone()
        };
        assert!(matches!(
            process_block_header(&mut state.clone(), &wrong_parent, &epochs_ctx),
            Err(BlockOperationError::Invalid(
                HeaderInvalid::ParentBlockRootMismatch { .. }
            ))
        ));

        let mut slashed_proposer = state.clone();
        slashed_proposer.validators[valid.proposer_index as usize].slashed = true;
        assert_eq!(
            process_block_header(&mut slashed_proposer, &valid, &epochs_ctx),
            Err(BlockOperationError::Invalid(HeaderInvalid::ProposerSlashed(
                valid.proposer_index
            )))
        );
    }

    #[test]
    fn test_randao_mix_is_updated() {
        let mut state = phase0_state(16, 9);
        let epochs_ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&MINIMAL, &verifier);
        let body = BeaconBlockBody {
            randao_reveal: BLSSignature::infinity(),
            ..Default::default()
        };

        process_randao(&mut state, &body, 0, &epochs_ctx, &ctx).unwrap();
        let expected = xor(
            B256::ZERO.as_slice(),
            hash(BLSSignature::infinity().to_bytes()).as_slice(),
        );
        assert_eq!(state.randao_mixes[1], expected);

        let verifier = FakeVerifier { valid: false };
        let ctx = TransitionContext::new(&MINIMAL, &verifier);
        assert_eq!(
            process_randao(&mut state, &body, 0, &epochs_ctx, &ctx),
            Err(BlockProcessingError::RandaoSignatureInvalid)
        );
    }

    #[test]
    fn test_eth1_vote_adopted_on_majority() {
        let mut state = phase0_state(0, 1);
        let vote = Eth1Data {
            deposit_root: B256::repeat_byte(3),
            deposit_count: 7,
            block_hash: B256::repeat_byte(4),
        };
        // Minimal voting period is 32 slots, so the 17th matching vote wins.
        for _ in 0..16 {
            process_eth1_data(&mut state, &vote, &MINIMAL).unwrap();
        }
        assert_eq!(state.eth1_data, Eth1Data::default());
        process_eth1_data(&mut state, &vote, &MINIMAL).unwrap();
        assert_eq!(state.eth1_data, vote);
    }
}
