use ember_bls::FakeVerifier;
use ember_consensus_beacon::{ForkedBeaconState, map_forked_state, view::BeaconStateView};
use ember_consensus_misc::{checkpoint::Checkpoint, constants::FAR_FUTURE_EPOCH};
use ember_network_spec::{ChainSpec, MINIMAL};
use ember_state_transition::{TransitionContext, process_slots, state_transition};
use rstest::rstest;
use transition_tests::{Harness, minimal_spec_with_altair_at};

fn set_balance(state: &mut ForkedBeaconState, index: usize, balance: u64) {
    map_forked_state!(state, |inner| inner.balances_mut()[index] = balance);
}

#[rstest]
#[case::phase0(MINIMAL.as_ref().clone())]
#[case::altair(minimal_spec_with_altair_at(0))]
fn test_genesis_epoch_skips_rewards_and_justification(#[case] spec: ChainSpec) {
    let harness = Harness::new(64, spec).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (mut state, mut epochs_ctx) = harness.genesis(&ctx).unwrap();
    let genesis_balances = state.balances().clone();

    let summaries = process_slots(&mut state, &mut epochs_ctx, 8, &ctx).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].epoch, 0);
    assert_eq!(state.balances(), &genesis_balances);
    map_forked_state!(&state, |inner| {
        assert_eq!(*inner.current_justified_checkpoint(), Checkpoint::default());
        assert_eq!(*inner.finalized_checkpoint(), Checkpoint::default());
    });
}

#[rstest]
#[case::phase0(MINIMAL.as_ref().clone())]
#[case::altair(minimal_spec_with_altair_at(0))]
fn test_full_participation_finalizes(#[case] spec: ChainSpec) {
    let harness = Harness::new(64, spec).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (mut state, mut epochs_ctx) = harness.genesis(&ctx).unwrap();

    let mut justified = Checkpoint::default();
    let mut finalized = Checkpoint::default();
    for slot in 1..=40 {
        let block = harness
            .produce_attested_block(&state, &epochs_ctx, slot, &ctx)
            .unwrap();
        state_transition(&mut state, &mut epochs_ctx, &block, true, &ctx).unwrap();

        let (next_justified, next_finalized) = map_forked_state!(&state, |inner| (
            *inner.current_justified_checkpoint(),
            *inner.finalized_checkpoint()
        ));
        assert!(next_justified.epoch >= justified.epoch);
        assert!(next_finalized.epoch >= finalized.epoch);
        assert!(next_finalized.epoch <= next_justified.epoch);
        justified = next_justified;
        finalized = next_finalized;
    }

    // From epoch 3 on every epoch justifies itself and finalizes its predecessor
    assert_eq!(justified.epoch, 4);
    assert_eq!(finalized.epoch, 3);
    // Everyone attested, so nobody lost money
    assert!(
        state
            .balances()
            .iter()
            .all(|&balance| balance >= harness.spec.max_effective_balance)
    );
}

#[rstest]
#[case::phase0(MINIMAL.as_ref().clone())]
#[case::altair(minimal_spec_with_altair_at(0))]
fn test_penalties_stop_at_zero_balance(#[case] spec: ChainSpec) {
    let harness = Harness::new(64, spec).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (mut state, mut epochs_ctx) = harness.genesis(&ctx).unwrap();

    // Drain the balance after the effective balance was last updated, so the penalty for
    // missing epoch 0 is computed from the full effective balance.
    process_slots(&mut state, &mut epochs_ctx, 15, &ctx).unwrap();
    set_balance(&mut state, 3, 1);
    process_slots(&mut state, &mut epochs_ctx, 16, &ctx).unwrap();

    assert_eq!(state.balances()[3], 0);
    assert_eq!(state.validators()[3].effective_balance, 0);
}

#[rstest]
#[case::above_max(37_000_000_000, 32_000_000_000)]
#[case::within_hysteresis(31_800_000_000, 32_000_000_000)]
#[case::below_hysteresis(31_700_000_000, 31_000_000_000)]
#[case::half(16_500_000_000, 16_000_000_000)]
fn test_effective_balance_hysteresis(#[case] balance: u64, #[case] expected: u64) {
    let harness = Harness::new(64, MINIMAL.as_ref().clone()).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (mut state, mut epochs_ctx) = harness.genesis(&ctx).unwrap();

    set_balance(&mut state, 9, balance);
    process_slots(&mut state, &mut epochs_ctx, 8, &ctx).unwrap();

    let effective_balance = state.validators()[9].effective_balance;
    assert_eq!(effective_balance, expected);
    for validator in state.validators().iter() {
        assert!(validator.effective_balance <= harness.spec.max_effective_balance);
        assert_eq!(
            validator.effective_balance % harness.spec.effective_balance_increment,
            0
        );
    }
}

#[test]
fn test_low_balance_validator_is_ejected() {
    let harness = Harness::new(64, MINIMAL.as_ref().clone()).unwrap();
    let verifier = FakeVerifier::default();
    let ctx = TransitionContext::new(&harness.spec, &verifier);
    let (mut state, mut epochs_ctx) = harness.genesis(&ctx).unwrap();

    set_balance(&mut state, 11, harness.spec.ejection_balance);
    process_slots(&mut state, &mut epochs_ctx, 8, &ctx).unwrap();
    // The effective balance drops at the end of epoch 0, the ejection follows an epoch later
    assert_eq!(
        state.validators()[11].effective_balance,
        harness.spec.ejection_balance
    );
    assert_eq!(state.validators()[11].exit_epoch, FAR_FUTURE_EPOCH);

    process_slots(&mut state, &mut epochs_ctx, 16, &ctx).unwrap();
    assert_eq!(
        state.validators()[11].exit_epoch,
        harness.spec.compute_activation_exit_epoch(1)
    );
    assert!(
        state
            .validators()
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != 11)
            .all(|(_, validator)| validator.exit_epoch == FAR_FUTURE_EPOCH)
    );
}
