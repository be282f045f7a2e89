//! Small registries for unit tests. Pubkeys are arbitrary bytes, so these states only work with
//! `FakeVerifier`.

use alloy_primitives::B256;
use ember_bls::PubKey;
use ember_consensus_beacon::{altair, phase0, view::BeaconStateView};
use ember_consensus_misc::validator::Validator;
use ember_network_spec::MINIMAL;

pub const BALANCE: u64 = 32_000_000_000;

pub fn pubkey(index: u64) -> PubKey {
    let mut bytes = [0u8; 48];
    bytes[..8].copy_from_slice(&(index + 1).to_le_bytes());
    PubKey::from_bytes(&bytes).unwrap()
}

pub fn active_validator(index: u64) -> Validator {
    let mut validator = Validator::from_deposit(
        pubkey(index),
        B256::ZERO,
        BALANCE,
        MINIMAL.effective_balance_increment,
        MINIMAL.max_effective_balance,
    );
    validator.activation_eligibility_epoch = 0;
    validator.activation_epoch = 0;
    validator
}

fn populate<S: BeaconStateView>(state: &mut S, validator_count: u64) {
    for index in 0..validator_count {
        state.push_validator(active_validator(index), BALANCE).unwrap();
    }
    for (slot, root) in state.block_roots_mut().iter_mut().enumerate() {
        *root = B256::with_last_byte(slot as u8 + 1);
    }
}

pub fn phase0_state(validator_count: u64, slot: u64) -> phase0::beacon_state::BeaconState {
    let mut state = phase0::beacon_state::BeaconState {
        slot,
        ..Default::default()
    };
    populate(&mut state, validator_count);
    state
}

pub fn altair_state(validator_count: u64, slot: u64) -> altair::beacon_state::BeaconState {
    let mut state = altair::beacon_state::BeaconState {
        slot,
        ..Default::default()
    };
    populate(&mut state, validator_count);
    state
}
