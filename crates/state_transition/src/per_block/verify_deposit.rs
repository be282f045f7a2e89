use alloy_primitives::B256;
use ember_bls::PubKey;
use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::{
    constants::{DEPOSIT_CONTRACT_TREE_DEPTH, DOMAIN_DEPOSIT},
    deposit::{Deposit, DepositData},
    misc::{compute_domain, compute_signing_root},
};
use ember_merkle::is_valid_merkle_branch;
use tree_hash::TreeHash;

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{BlockOperationError, DepositInvalid},
};

/// Verify the deposit's merkle branch against the state's eth1 deposit root, as leaf
/// `deposit_index`.
pub fn verify_deposit_merkle_proof<S: BeaconStateView>(
    state: &S,
    deposit: &Deposit,
    deposit_index: u64,
) -> Result<(), BlockOperationError<DepositInvalid>> {
    verify!(
        is_valid_merkle_branch(
            deposit.data.tree_hash_root(),
            &deposit.proof,
            // Add 1 for the List length mix-in
            DEPOSIT_CONTRACT_TREE_DEPTH + 1,
            deposit_index,
            state.eth1_data().deposit_root,
        ),
        DepositInvalid::BadMerkleProof(deposit_index)
    );
    Ok(())
}

/// Proof of possession, which the deposit contract does not check.
///
/// The domain is fork-agnostic: deposits stay valid across forks.
pub fn verify_deposit_signature(deposit_data: &DepositData, ctx: &TransitionContext) -> bool {
    let domain = compute_domain(DOMAIN_DEPOSIT, ctx.spec.genesis_fork_version, B256::ZERO);
    let signing_root = compute_signing_root(&deposit_data.as_message(), domain);
    ctx.verifier.verify(
        &deposit_data.pubkey,
        signing_root.as_slice(),
        &deposit_data.signature,
    )
}

/// Registry index of `pubkey`, if the state already knows it.
pub fn get_existing_validator_index<S: BeaconStateView>(
    state: &S,
    epochs_ctx: &EpochsContext,
    pubkey: &PubKey,
) -> Option<u64> {
    epochs_ctx
        .pubkey_cache
        .get_index(pubkey)
        .filter(|&index| index < state.validators().len() as u64)
}
