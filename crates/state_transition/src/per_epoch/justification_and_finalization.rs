use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::{
    checkpoint::Checkpoint,
    constants::{GENESIS_EPOCH, JUSTIFICATION_BITS_LENGTH},
};
use ember_network_spec::ChainSpec;

use crate::errors::EpochProcessingError;

/// Updates the justified and finalized checkpoints from the target balances of the previous and
/// current epoch.
///
/// Initial FFG checkpoint values have a `0x00` stub for `root`. FFG updates are skipped in the
/// first two epochs to avoid corner cases that might result in modifying this stub.
pub fn process_justification_and_finalization<S: BeaconStateView>(
    state: &mut S,
    total_active_balance: u64,
    previous_epoch_target_balance: u64,
    current_epoch_target_balance: u64,
    spec: &ChainSpec,
) -> Result<(), EpochProcessingError> {
    if state.get_current_epoch(spec) <= GENESIS_EPOCH + 1 {
        return Ok(());
    }
    weigh_justification_and_finalization(
        state,
        total_active_balance,
        previous_epoch_target_balance,
        current_epoch_target_balance,
        spec,
    )
}

pub fn weigh_justification_and_finalization<S: BeaconStateView>(
    state: &mut S,
    total_active_balance: u64,
    previous_epoch_target_balance: u64,
    current_epoch_target_balance: u64,
    spec: &ChainSpec,
) -> Result<(), EpochProcessingError> {
    let previous_epoch = state.get_previous_epoch(spec);
    let current_epoch = state.get_current_epoch(spec);
    let old_previous_justified_checkpoint = *state.previous_justified_checkpoint();
    let old_current_justified_checkpoint = *state.current_justified_checkpoint();

    // Process justifications
    *state.previous_justified_checkpoint_mut() = old_current_justified_checkpoint;
    let mut bits = state.justification_bits().iter().collect::<Vec<_>>();
    bits.rotate_right(1);
    bits[0] = false;

    if previous_epoch_target_balance * 3 >= total_active_balance * 2 {
        *state.current_justified_checkpoint_mut() = Checkpoint {
            epoch: previous_epoch,
            root: state.get_block_root(previous_epoch, spec)?,
        };
        bits[1] = true;
    }
    if current_epoch_target_balance * 3 >= total_active_balance * 2 {
        *state.current_justified_checkpoint_mut() = Checkpoint {
            epoch: current_epoch,
            root: state.get_block_root(current_epoch, spec)?,
        };
        bits[0] = true;
    }
    let justification_bits = state.justification_bits_mut();
    for (i, &bit) in bits.iter().enumerate().take(JUSTIFICATION_BITS_LENGTH) {
        justification_bits
            .set(i, bit)
            .map_err(|err| EpochProcessingError::JustificationBits(format!("{err:?}")))?;
    }

    // Process finalizations
    // The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
    if bits[1..4].iter().all(|&bit| bit)
        && old_previous_justified_checkpoint.epoch + 3 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_previous_justified_checkpoint;
    }
    // The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
    if bits[1..3].iter().all(|&bit| bit)
        && old_previous_justified_checkpoint.epoch + 2 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_previous_justified_checkpoint;
    }
    // The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
    if bits[0..3].iter().all(|&bit| bit)
        && old_current_justified_checkpoint.epoch + 2 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_current_justified_checkpoint;
    }
    // The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
    if bits[0..2].iter().all(|&bit| bit)
        && old_current_justified_checkpoint.epoch + 1 == current_epoch
    {
        *state.finalized_checkpoint_mut() = old_current_justified_checkpoint;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ember_consensus_beacon::phase0::beacon_state::BeaconState;
    use ember_network_spec::MINIMAL;

    use super::*;

    const TOTAL: u64 = 300;

    fn state_at_epoch(epoch: u64) -> BeaconState {
        let mut state = BeaconState {
            slot: epoch * MINIMAL.slots_per_epoch + MINIMAL.slots_per_epoch - 1,
            ..Default::default()
        };
        for (i, root) in state.block_roots.iter_mut().enumerate() {
            *root = B256::with_last_byte((i / MINIMAL.slots_per_epoch as usize) as u8 + 1);
        }
        state
    }

    #[test]
    fn test_genesis_epochs_are_skipped() {
        for epoch in [0, 1] {
            let mut state = state_at_epoch(epoch);
            process_justification_and_finalization(&mut state, TOTAL, TOTAL, TOTAL, &MINIMAL)
                .unwrap();
            assert_eq!(state.current_justified_checkpoint, Checkpoint::default());
            assert_eq!(state.finalized_checkpoint, Checkpoint::default());
            assert_eq!(state.justification_bits.num_set_bits(), 0);
        }
    }

    #[test]
    fn test_two_thirds_justifies_and_consecutive_justification_finalizes() {
        let mut state = state_at_epoch(2);
        process_justification_and_finalization(&mut state, TOTAL, 200, 199, &MINIMAL).unwrap();
        assert_eq!(state.current_justified_checkpoint.epoch, 1);
        assert_eq!(state.finalized_checkpoint.epoch, 0);
        assert!(!state.justification_bits.get(0).unwrap());
        assert!(state.justification_bits.get(1).unwrap());

        let mut state = BeaconState {
            slot: state.slot + MINIMAL.slots_per_epoch,
            ..state
        };
        process_justification_and_finalization(&mut state, TOTAL, 200, 200, &MINIMAL).unwrap();
        // Epoch 2 justified with epoch 1 as source: epoch 1 is finalized.
        assert_eq!(state.current_justified_checkpoint.epoch, 3);
        assert_eq!(state.previous_justified_checkpoint.epoch, 1);
        let bits = (0..JUSTIFICATION_BITS_LENGTH)
            .map(|i| state.justification_bits.get(i).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(bits, [true, true, true, false]);
        assert_eq!(
            state.finalized_checkpoint,
            Checkpoint {
                epoch: 1,
                root: B256::with_last_byte(2),
            }
        );
    }

    #[test]
    fn test_finality_never_moves_backwards() {
        let mut state = state_at_epoch(2);
        let mut last_finalized = 0;
        for step in 0..8 {
            let (previous, current) = if step % 3 == 2 { (0, 0) } else { (TOTAL, TOTAL) };
            process_justification_and_finalization(&mut state, TOTAL, previous, current, &MINIMAL)
                .unwrap();
            assert!(state.finalized_checkpoint.epoch >= last_finalized);
            last_finalized = state.finalized_checkpoint.epoch;
            state.slot += MINIMAL.slots_per_epoch;
        }
        assert!(last_finalized > 0);
    }
}
