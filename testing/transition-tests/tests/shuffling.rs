use alloy_primitives::B256;
use ember_bls::PubKey;
use ember_consensus_beacon::{phase0::beacon_state::BeaconState, view::BeaconStateView};
use ember_consensus_misc::{
    constants::DOMAIN_BEACON_ATTESTER,
    shuffle::{compute_committee, compute_shuffled_index, shuffle_list},
    validator::Validator,
};
use ember_network_spec::MINIMAL;
use ember_state_transition::EpochsContext;
use rstest::rstest;

fn state_with_validators(validator_count: u64) -> BeaconState {
    let mut state = BeaconState::default();
    for index in 0..validator_count {
        let mut pubkey = [0u8; 48];
        pubkey[..8].copy_from_slice(&(index + 1).to_le_bytes());
        let mut validator = Validator::from_deposit(
            PubKey::from_bytes(&pubkey).unwrap(),
            B256::ZERO,
            MINIMAL.max_effective_balance,
            MINIMAL.effective_balance_increment,
            MINIMAL.max_effective_balance,
        );
        validator.activation_eligibility_epoch = 0;
        validator.activation_epoch = 0;
        state
            .push_validator(validator, MINIMAL.max_effective_balance)
            .unwrap();
    }
    for (epoch, mix) in state.randao_mixes.iter_mut().enumerate() {
        *mix = B256::with_last_byte(epoch as u8);
    }
    state
}

#[rstest]
#[case(1, B256::ZERO)]
#[case(2, B256::repeat_byte(0x5a))]
#[case(100, B256::repeat_byte(0x01))]
#[case(333, B256::repeat_byte(0xc3))]
fn test_shuffle_list_matches_shuffled_index(#[case] count: usize, #[case] seed: B256) {
    let rounds = MINIMAL.shuffle_round_count;
    let input = (0..count as u64).map(|index| index * 7 + 3).collect::<Vec<_>>();
    let shuffled = shuffle_list(input.clone(), rounds, seed, false).unwrap();

    for (position, &value) in shuffled.iter().enumerate() {
        let source = compute_shuffled_index(position, count, seed, rounds).unwrap();
        assert_eq!(value, input[source]);
    }

    let mut sorted = shuffled.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, input);

    // Shuffling forwards undoes shuffling backwards
    assert_eq!(shuffle_list(shuffled, rounds, seed, true).unwrap(), input);
}

#[rstest]
#[case(8)]
#[case(64)]
#[case(100)]
#[case(333)]
fn test_committees_partition_active_validators(#[case] validator_count: u64) {
    let spec = MINIMAL.as_ref();
    let state = state_with_validators(validator_count);
    let epochs_ctx = EpochsContext::new(&state, spec).unwrap();
    let epoch = state.get_current_epoch(spec);
    let shuffling = epochs_ctx.get_shuffling(epoch).unwrap();

    let committees_per_slot = epochs_ctx.get_committee_count_per_slot(epoch).unwrap();
    assert_eq!(
        committees_per_slot,
        state.get_committee_count_per_slot(epoch, spec)
    );

    let seed = state.get_seed(epoch, DOMAIN_BEACON_ATTESTER, spec);
    let active_indices = state.get_active_validator_indices(epoch);
    let mut seen = vec![];
    for slot in 0..spec.slots_per_epoch {
        for index in 0..committees_per_slot {
            let committee = epochs_ctx.get_beacon_committee(slot, index).unwrap();
            let expected = compute_committee(
                &active_indices,
                seed,
                slot * committees_per_slot + index,
                committees_per_slot * spec.slots_per_epoch,
                spec.shuffle_round_count,
            )
            .unwrap();
            assert_eq!(committee, expected.as_slice());
            seen.extend_from_slice(committee);
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, active_indices);
    assert_eq!(shuffling.committees().count() as u64, shuffling.committee_count());

    assert!(
        epochs_ctx
            .get_beacon_committee(0, committees_per_slot)
            .is_err()
    );
}

#[test]
fn test_proposers_are_active_and_stable() {
    let spec = MINIMAL.as_ref();
    let mut state = state_with_validators(64);
    // Validator 2 leaves before epoch 0 starts, it must never be picked
    state.validators[2].exit_epoch = 0;
    let epochs_ctx = EpochsContext::new(&state, spec).unwrap();

    for slot in 0..spec.slots_per_epoch {
        let proposer = epochs_ctx.get_beacon_proposer(slot).unwrap();
        assert_ne!(proposer, 2);
        assert!(proposer < 64);
    }

    let rebuilt = EpochsContext::new(&state, spec).unwrap();
    assert_eq!(rebuilt.proposers(), epochs_ctx.proposers());
    assert!(
        epochs_ctx
            .get_beacon_proposer(spec.slots_per_epoch)
            .is_err()
    );
}
