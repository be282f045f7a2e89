//! Phase0 epoch processing. Participation comes from the pending attestations stored in the
//! state, profiled once per epoch into [`ValidatorStatuses`].

pub mod rewards_and_penalties;
pub mod validator_statuses;

use ember_consensus_beacon::view::{BeaconStateView, PendingAttestationsView};
use ember_consensus_misc::constants::GENESIS_EPOCH;
pub use rewards_and_penalties::{get_attestation_deltas, process_rewards_and_penalties};
pub use validator_statuses::{InclusionInfo, TotalBalances, ValidatorStatus, ValidatorStatuses};

use super::{
    EpochProcessingSummary,
    justification_and_finalization::process_justification_and_finalization,
    registry_updates::process_registry_updates,
    resets::{
        process_effective_balance_updates, process_eth1_data_reset,
        process_historical_roots_update, process_participation_record_updates,
        process_randao_mixes_reset, process_slashings_reset,
    },
    slashings::process_slashings,
};
use crate::{context::TransitionContext, epoch_context::EpochsContext, errors::EpochProcessingError};

pub fn process_epoch<S: PendingAttestationsView>(
    state: &mut S,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<EpochProcessingSummary, EpochProcessingError> {
    let spec = ctx.spec;
    let current_epoch = state.get_current_epoch(spec);

    let validator_statuses = ValidatorStatuses::new(state, epochs_ctx, ctx)?;
    let totals = &validator_statuses.total_balances;
    ctx.check_cancelled()?;

    process_justification_and_finalization(
        state,
        totals.current_epoch(),
        totals.previous_epoch_target_attesters(),
        totals.current_epoch_target_attesters(),
        spec,
    )?;
    ctx.check_cancelled()?;

    // No previous epoch to reward at genesis.
    if current_epoch != GENESIS_EPOCH {
        process_rewards_and_penalties(state, &validator_statuses, ctx)?;
        ctx.check_cancelled()?;
    }

    process_registry_updates(state, ctx)?;
    ctx.check_cancelled()?;
    process_slashings(state, totals.current_epoch(), ctx)?;
    ctx.check_cancelled()?;

    process_eth1_data_reset(state, spec);
    process_effective_balance_updates(state, ctx)?;
    process_slashings_reset(state, spec);
    process_randao_mixes_reset(state, spec);
    process_historical_roots_update(state, spec)?;
    process_participation_record_updates(state);

    Ok(EpochProcessingSummary {
        epoch: current_epoch,
        total_active_balance: totals.current_epoch(),
        previous_epoch_source_attesting_balance: totals.previous_epoch_source_attesters(),
        previous_epoch_target_attesting_balance: totals.previous_epoch_target_attesters(),
        previous_epoch_head_attesting_balance: totals.previous_epoch_head_attesters(),
        current_epoch_target_attesting_balance: totals.current_epoch_target_attesters(),
        current_justified_checkpoint: *state.current_justified_checkpoint(),
        finalized_checkpoint: *state.finalized_checkpoint(),
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ember_bls::{FakeVerifier, PubKey};
    use ember_consensus_beacon::phase0::beacon_state::BeaconState;
    use ember_consensus_misc::{
        attestation_data::AttestationData, checkpoint::Checkpoint,
        pending_attestation::PendingAttestation, validator::Validator,
    };
    use ember_network_spec::MINIMAL;
    use ssz_types::BitList;

    use super::*;

    const VALIDATORS: u64 = 16;

    fn state_at_last_slot_of(epoch: u64) -> BeaconState {
        let mut state = BeaconState {
            slot: (epoch + 1) * MINIMAL.slots_per_epoch - 1,
            ..Default::default()
        };
        for index in 0..VALIDATORS {
            let mut bytes = [0u8; 48];
            bytes[..8].copy_from_slice(&index.to_le_bytes());
            let mut validator = Validator::from_deposit(
                PubKey::from_bytes(&bytes).unwrap(),
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
        for (slot, root) in state.block_roots.iter_mut().enumerate() {
            *root = B256::with_last_byte(slot as u8 + 1);
        }
        state
    }

    /// Every committee of `epoch` attests to the state's own roots, included one slot later.
    fn attest_full_epoch(state: &mut BeaconState, epochs_ctx: &EpochsContext, epoch: u64) {
        let start_slot = MINIMAL.compute_start_slot_at_epoch(epoch);
        let target = Checkpoint {
            epoch,
            root: state.block_roots[start_slot as usize],
        };
        for slot in start_slot..start_slot + MINIMAL.slots_per_epoch {
            for index in 0..epochs_ctx.get_committee_count_per_slot(epoch).unwrap() {
                let committee = epochs_ctx.get_beacon_committee(slot, index).unwrap();
                let mut aggregation_bits = BitList::with_capacity(committee.len()).unwrap();
                for bit in 0..committee.len() {
                    aggregation_bits.set(bit, true).unwrap();
                }
                state
                    .previous_epoch_attestations
                    .push(PendingAttestation {
                        aggregation_bits,
                        data: AttestationData {
                            slot,
                            index,
                            beacon_block_root: state.block_roots[slot as usize],
                            source: Checkpoint::default(),
                            target,
                        },
                        inclusion_delay: 1,
                        proposer_index: 0,
                    })
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_full_participation_is_rewarded_and_justified() {
        let mut state = state_at_last_slot_of(2);
        let epochs_ctx = EpochsContext::new(&state, &MINIMAL).unwrap();
        attest_full_epoch(&mut state, &epochs_ctx, 1);

        let verifier = FakeVerifier::default();
        let summary =
            process_epoch(&mut state, &epochs_ctx, &TransitionContext::new(&MINIMAL, &verifier))
                .unwrap();
        let total = VALIDATORS * MINIMAL.max_effective_balance;
        assert_eq!(summary.epoch, 2);
        assert_eq!(summary.total_active_balance, total);
        assert_eq!(summary.previous_epoch_target_attesting_balance, total);
        assert_eq!(summary.previous_epoch_head_attesting_balance, total);
        assert!(summary.is_previous_epoch_target_supermajority());
        assert_eq!(state.current_justified_checkpoint.epoch, 1);
        assert!(
            state
                .balances
                .iter()
                .all(|&balance| balance > MINIMAL.max_effective_balance)
        );
        // The including proposer collects a proposer reward from every attester.
        assert!(state.balances[0] > state.balances[1]);
        // Records rotate: the current epoch's (empty) list became the previous one.
        assert!(state.previous_epoch_attestations.is_empty());
    }

    #[test]
    fn test_missed_epoch_is_penalized() {
        let mut state = state_at_last_slot_of(2);
        let epochs_ctx = EpochsContext::new(&state, &MINIMAL).unwrap();

        let verifier = FakeVerifier::default();
        let summary =
            process_epoch(&mut state, &epochs_ctx, &TransitionContext::new(&MINIMAL, &verifier))
                .unwrap();
        assert!(!summary.is_previous_epoch_target_supermajority());
        assert_eq!(state.current_justified_checkpoint, Checkpoint::default());
        assert!(
            state
                .balances
                .iter()
                .all(|&balance| balance < MINIMAL.max_effective_balance)
        );
    }

    #[test]
    fn test_genesis_epoch_skips_rewards() {
        let mut state = state_at_last_slot_of(0);
        let epochs_ctx = EpochsContext::new(&state, &MINIMAL).unwrap();

        let verifier = FakeVerifier::default();
        process_epoch(&mut state, &epochs_ctx, &TransitionContext::new(&MINIMAL, &verifier))
            .unwrap();
        assert!(
            state
                .balances
                .iter()
                .all(|&balance| balance == MINIMAL.max_effective_balance)
        );
    }
}
