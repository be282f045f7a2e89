use alloy_primitives::B256;
use ember_consensus_beacon::{
    ForkedBeaconState,
    phase0::{beacon_block::BeaconBlockBody, beacon_state::BeaconState},
    view::BeaconStateView,
};
use ember_consensus_misc::{
    beacon_block_header::BeaconBlockHeader,
    constants::{DEPOSIT_CONTRACT_TREE_DEPTH, EPOCHS_PER_HISTORICAL_VECTOR, GENESIS_EPOCH},
    deposit::Deposit,
    eth_1_data::Eth1Data,
    fork::Fork,
};
use ember_merkle::DepositTree;
use ember_network_spec::ChainSpec;
use ssz_types::FixedVector;
use tree_hash::TreeHash;

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{GenesisError, IntoWithIndex},
    per_block::process_deposit,
    upgrade::upgrade_to_altair,
};

/// Builds the genesis state from the deposits observed in the eth1 block `eth1_block_hash`.
///
/// Validators deposited with the maximum effective balance are active from the genesis epoch.
/// If the altair fork is scheduled at genesis the state is upgraded before it is returned.
pub fn initialize_beacon_state_from_eth1(
    eth1_block_hash: B256,
    eth1_timestamp: u64,
    deposits: &[Deposit],
    ctx: &TransitionContext,
) -> Result<ForkedBeaconState, GenesisError> {
    let spec = ctx.spec;
    let mut state = BeaconState {
        genesis_time: eth1_timestamp + spec.genesis_delay,
        fork: Fork {
            previous_version: spec.genesis_fork_version,
            current_version: spec.genesis_fork_version,
            epoch: GENESIS_EPOCH,
        },
        eth1_data: Eth1Data {
            deposit_root: B256::ZERO,
            deposit_count: deposits.len() as u64,
            block_hash: eth1_block_hash,
        },
        latest_block_header: BeaconBlockHeader {
            body_root: BeaconBlockBody::default().tree_hash_root(),
            ..Default::default()
        },
        // Seed RANDAO with Eth1 entropy
        randao_mixes: FixedVector::from(vec![
            eth1_block_hash;
            EPOCHS_PER_HISTORICAL_VECTOR as usize
        ]),
        ..Default::default()
    };

    // Process deposits, each against the deposit root of the tree holding it and its predecessors
    let mut epochs_ctx = EpochsContext::new(&state, spec)?;
    let mut deposit_tree = DepositTree::new(DEPOSIT_CONTRACT_TREE_DEPTH as usize);
    for (index, deposit) in deposits.iter().enumerate() {
        deposit_tree
            .push_leaf(deposit.data.tree_hash_root())
            .map_err(|err| GenesisError::DepositTree(err.to_string()))?;
        state.eth1_data.deposit_root = deposit_tree.root();
        process_deposit(&mut state, deposit, &mut epochs_ctx, ctx)
            .map_err(|err| err.into_with_index(index))?;
    }

    // Process activations
    for (validator, &balance) in state.validators.iter_mut().zip(state.balances.iter()) {
        validator.effective_balance = (balance - balance % spec.effective_balance_increment)
            .min(spec.max_effective_balance);
        if validator.effective_balance == spec.max_effective_balance {
            validator.activation_eligibility_epoch = GENESIS_EPOCH;
            validator.activation_epoch = GENESIS_EPOCH;
        }
    }

    // Set genesis validators root for domain separation and chain versioning
    state.genesis_validators_root = state.validators.tree_hash_root();

    if spec.altair_fork_epoch == GENESIS_EPOCH {
        let epochs_ctx =
            EpochsContext::with_pubkey_cache(&state, epochs_ctx.pubkey_cache, spec)?;
        let mut post = upgrade_to_altair(&state, &epochs_ctx, ctx)?;
        // A chain that starts at altair has no phase0 version to fall back to
        post.fork.previous_version = spec.altair_fork_version;
        return Ok(post.into());
    }
    Ok(state.into())
}

/// Whether `state` has enough active validators and a late enough genesis time to start the
/// chain.
pub fn is_valid_genesis_state<S: BeaconStateView>(state: &S, spec: &ChainSpec) -> bool {
    if state.genesis_time() < spec.min_genesis_time {
        return false;
    }
    state.get_active_validator_indices(GENESIS_EPOCH).len() as u64
        >= spec.min_genesis_active_validator_count
}

#[cfg(test)]
mod tests {
    use ember_bls::{BLSSignature, FakeVerifier};
    use ember_consensus_misc::deposit::DepositData;
    use ember_network_spec::MINIMAL;

    use super::*;
    use crate::test_utils::pubkey;

    fn deposits(amounts: &[u64]) -> Vec<Deposit> {
        let data = amounts
            .iter()
            .enumerate()
            .map(|(index, &amount)| DepositData {
                pubkey: pubkey(index as u64),
                withdrawal_credentials: B256::ZERO,
                amount,
                signature: BLSSignature::infinity(),
            })
            .collect::<Vec<_>>();
        let mut tree = DepositTree::new(DEPOSIT_CONTRACT_TREE_DEPTH as usize);
        let mut deposits = vec![];
        for (index, data) in data.into_iter().enumerate() {
            tree.push_leaf(data.tree_hash_root()).unwrap();
            deposits.push(Deposit {
                proof: FixedVector::new(tree.generate_proof(index).unwrap()).unwrap(),
                data,
            });
        }
        deposits
    }

    #[test]
    fn test_genesis_activates_full_deposits() {
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&MINIMAL, &verifier);
        let max = MINIMAL.max_effective_balance;
        let deposits = deposits(&[max, max / 2, max + 1_500_000_000]);

        let state = initialize_beacon_state_from_eth1(B256::repeat_byte(0x42), 100, &deposits, &ctx)
            .unwrap();
        let state = state.as_phase0().unwrap();
        assert_eq!(state.validators.len(), 3);
        assert_eq!(state.eth1_deposit_index, 3);
        assert_eq!(state.genesis_time, 100 + MINIMAL.genesis_delay);
        assert_eq!(state.randao_mixes[5], B256::repeat_byte(0x42));
        assert_eq!(state.balances[2], max + 1_500_000_000);
        assert_eq!(state.validators[2].effective_balance, max);

        let active = state.get_active_validator_indices(GENESIS_EPOCH);
        assert_eq!(active, vec![0, 2]);
        assert_eq!(
            state.genesis_validators_root,
            state.validators.tree_hash_root()
        );
    }

    #[test]
    fn test_genesis_validity() {
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&MINIMAL, &verifier);
        let max = MINIMAL.max_effective_balance;
        let count = MINIMAL.min_genesis_active_validator_count as usize;

        let state = initialize_beacon_state_from_eth1(
            B256::ZERO,
            MINIMAL.min_genesis_time,
            &deposits(&vec![max; count]),
            &ctx,
        )
        .unwrap();
        assert!(is_valid_genesis_state(state.as_phase0().unwrap(), &MINIMAL));

        let state = initialize_beacon_state_from_eth1(
            B256::ZERO,
            MINIMAL.min_genesis_time,
            &deposits(&vec![max; count - 1]),
            &ctx,
        )
        .unwrap();
        assert!(!is_valid_genesis_state(state.as_phase0().unwrap(), &MINIMAL));
    }

    #[test]
    fn test_genesis_at_altair_fork() {
        let spec = ChainSpec {
            altair_fork_epoch: GENESIS_EPOCH,
            ..MINIMAL.as_ref().clone()
        };
        let verifier = FakeVerifier::default();
        let ctx = TransitionContext::new(&spec, &verifier);
        let deposits = deposits(&[spec.max_effective_balance; 8]);

        let state = initialize_beacon_state_from_eth1(B256::ZERO, 0, &deposits, &ctx).unwrap();
        let state = state.as_altair().unwrap();
        assert_eq!(state.fork.previous_version, spec.altair_fork_version);
        assert_eq!(state.fork.current_version, spec.altair_fork_version);
        assert_eq!(state.previous_epoch_participation.len(), 8);
    }
}
