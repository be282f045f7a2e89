use ember_bls::FakeVerifier;
use ember_consensus_beacon::ForkedBeaconState;
use ember_consensus_misc::fork::ForkName;
use ember_network_spec::{ChainSpec, MINIMAL};
use ember_state_transition::{
    TransitionContext, errors::SlotProcessingError, process_slots, state_transition,
};
use rstest::rstest;
use tokio_util::sync::CancellationToken;
use transition_tests::{Harness, minimal_spec_with_altair_at};

#[rstest]
#[case::phase0(MINIMAL.as_ref().clone())]
#[case::altair(minimal_spec_with_altair_at(0))]
#[case::fork_at_epoch_2(minimal_spec_with_altair_at(2))]
fn test_replaying_blocks_is_deterministic(#[case] spec: ChainSpec) {
    let harness = Harness::new(64, spec).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (genesis, genesis_epochs_ctx) = harness.genesis(&ctx).unwrap();

    let mut state = genesis.clone();
    let mut epochs_ctx = genesis_epochs_ctx.clone();
    let mut blocks = vec![];
    for slot in 1..=20 {
        let block = harness
            .produce_attested_block(&state, &epochs_ctx, slot, &ctx)
            .unwrap();
        state_transition(&mut state, &mut epochs_ctx, &block, true, &ctx).unwrap();
        blocks.push(block);
    }

    let mut replayed = genesis.clone();
    let mut replayed_epochs_ctx = genesis_epochs_ctx.clone();
    for block in &blocks {
        state_transition(&mut replayed, &mut replayed_epochs_ctx, block, true, &ctx).unwrap();
    }
    assert_eq!(replayed.as_ssz_bytes(), state.as_ssz_bytes());
    assert_eq!(replayed.state_root(), state.state_root());
    assert_eq!(replayed_epochs_ctx.epoch(), epochs_ctx.epoch());

    let decoded = ForkedBeaconState::from_ssz_bytes(&state.as_ssz_bytes(), state.fork_name()).unwrap();
    assert_eq!(decoded, state);
}

#[test]
fn test_chain_crosses_altair_fork() {
    let harness = Harness::new(64, minimal_spec_with_altair_at(2)).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (mut state, mut epochs_ctx) = harness.genesis(&ctx).unwrap();

    harness
        .extend_chain(&mut state, &mut epochs_ctx, 1..=15, &ctx)
        .unwrap();
    assert_eq!(state.fork_name(), ForkName::Phase0);

    // Pending attestations of epoch 1 are carried over as participation flags
    let mut upgraded = state.clone();
    let mut upgraded_epochs_ctx = epochs_ctx.clone();
    process_slots(&mut upgraded, &mut upgraded_epochs_ctx, 16, &ctx).unwrap();
    let upgraded = upgraded.as_altair().unwrap();
    assert!(
        upgraded
            .previous_epoch_participation
            .iter()
            .any(|&flags| flags != 0)
    );
    assert!(
        upgraded
            .current_epoch_participation
            .iter()
            .all(|&flags| flags == 0)
    );

    // The block at the first slot of epoch 2 is already an altair block
    harness
        .extend_chain(&mut state, &mut epochs_ctx, 16..=26, &ctx)
        .unwrap();
    let altair = state.as_altair().unwrap();
    assert_eq!(altair.fork.epoch, 2);
    assert_eq!(altair.fork.current_version, harness.spec.altair_fork_version);
    assert_eq!(altair.fork.previous_version, harness.spec.genesis_fork_version);
    assert_eq!(altair.inactivity_scores.len(), altair.validators.len());
}

#[test]
fn test_cancelled_transition_leaves_state_untouched() {
    let harness = Harness::new(64, MINIMAL.as_ref().clone()).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (mut state, mut epochs_ctx) = harness.genesis(&ctx).unwrap();
    let block = harness
        .produce_attested_block(&state, &epochs_ctx, 9, &ctx)
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let cancellable = ctx.with_cancellation(&token);
    let before = state.clone();
    let err = state_transition(&mut state, &mut epochs_ctx, &block, true, &cancellable).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(state, before);
    assert_eq!(epochs_ctx.epoch(), 0);

    let err = process_slots(&mut state, &mut epochs_ctx, 3, &cancellable).unwrap_err();
    assert_eq!(err, SlotProcessingError::Cancelled);

    // A live token does not get in the way
    let token = CancellationToken::new();
    let live = ctx.with_cancellation(&token);
    state_transition(&mut state, &mut epochs_ctx, &block, true, &live).unwrap();
    assert_eq!(state.slot(), 9);
    assert_eq!(epochs_ctx.epoch(), 1);
}
