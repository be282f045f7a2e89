use ember_consensus_beacon::{block::BeaconBlockBodyView, view::BeaconStateView};
use ember_consensus_misc::{
    attester_slashing::AttesterSlashing,
    deposit::{Deposit, DepositData},
    proposer_slashing::ProposerSlashing,
    validator::Validator,
    voluntary_exit::SignedVoluntaryExit,
};
use tracing::{debug, trace};

use super::{
    BlockProcessingState, get_existing_validator_index, verify_attester_slashing,
    verify_deposit_merkle_proof, verify_deposit_signature, verify_exit, verify_proposer_slashing,
};
use crate::{
    common::{initiate_validator_exit, slash_validator},
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{
        AttesterSlashingInvalid, BlockOperationError, BlockProcessingError, DepositInvalid,
        ExitInvalid, IntoWithIndex, ProposerSlashingInvalid,
    },
};

fn verify_operation_count(
    kind: &'static str,
    found: usize,
    max: u64,
) -> Result<(), BlockProcessingError> {
    if found as u64 > max {
        return Err(BlockProcessingError::TooManyOperations { kind, found, max });
    }
    Ok(())
}

pub fn process_operations<S: BlockProcessingState, Body: BeaconBlockBodyView>(
    state: &mut S,
    body: &Body,
    proposer_index: u64,
    epochs_ctx: &mut EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockProcessingError> {
    let spec = ctx.spec;
    verify_operation_count(
        "proposer slashings",
        body.proposer_slashings().len(),
        spec.max_proposer_slashings,
    )?;
    verify_operation_count(
        "attester slashings",
        body.attester_slashings().len(),
        spec.max_attester_slashings,
    )?;
    verify_operation_count(
        "attestations",
        body.attestations().len(),
        spec.max_attestations,
    )?;
    verify_operation_count(
        "voluntary exits",
        body.voluntary_exits().len(),
        spec.max_voluntary_exits,
    )?;
    // Verify that outstanding deposits are processed up to the maximum number of deposits
    let outstanding_deposits = state
        .eth1_data()
        .deposit_count
        .saturating_sub(state.eth1_deposit_index());
    let expected_deposits = spec.max_deposits.min(outstanding_deposits);
    if body.deposits().len() as u64 != expected_deposits {
        return Err(BlockProcessingError::DepositCountInvalid {
            expected: expected_deposits,
            found: body.deposits().len() as u64,
        });
    }
    trace!(
        proposer_slashings = body.proposer_slashings().len(),
        attester_slashings = body.attester_slashings().len(),
        attestations = body.attestations().len(),
        deposits = body.deposits().len(),
        voluntary_exits = body.voluntary_exits().len(),
        "Processing block operations"
    );

    for (index, proposer_slashing) in body.proposer_slashings().iter().enumerate() {
        process_proposer_slashing(state, proposer_slashing, proposer_index, epochs_ctx, ctx)
            .map_err(|err| err.into_with_index(index))?;
    }
    for (index, attester_slashing) in body.attester_slashings().iter().enumerate() {
        process_attester_slashing(state, attester_slashing, proposer_index, epochs_ctx, ctx)
            .map_err(|err| err.into_with_index(index))?;
    }
    ctx.check_cancelled()?;
    state.process_attestations(body.attestations(), proposer_index, epochs_ctx, ctx)?;
    ctx.check_cancelled()?;
    for (index, deposit) in body.deposits().iter().enumerate() {
        process_deposit(state, deposit, epochs_ctx, ctx).map_err(|err| err.into_with_index(index))?;
    }
    for (index, voluntary_exit) in body.voluntary_exits().iter().enumerate() {
        process_voluntary_exit(state, voluntary_exit, epochs_ctx, ctx)
            .map_err(|err| err.into_with_index(index))?;
    }
    Ok(())
}

pub fn process_proposer_slashing<S: BeaconStateView>(
    state: &mut S,
    proposer_slashing: &ProposerSlashing,
    proposer_index: u64,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<ProposerSlashingInvalid>> {
    verify_proposer_slashing(proposer_slashing, state, epochs_ctx, ctx)?;
    slash_validator(
        state,
        proposer_slashing.signed_header_1.message.proposer_index,
        proposer_index,
        None,
        ctx.spec,
    )?;
    Ok(())
}

pub fn process_attester_slashing<S: BeaconStateView>(
    state: &mut S,
    attester_slashing: &AttesterSlashing,
    proposer_index: u64,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<AttesterSlashingInvalid>> {
    let slashable_indices = verify_attester_slashing(state, attester_slashing, epochs_ctx, ctx)?;
    for index in slashable_indices {
        slash_validator(state, index, proposer_index, None, ctx.spec)?;
    }
    Ok(())
}

/// Verifies the deposit proof at the state's deposit index, then applies it.
pub fn process_deposit<S: BeaconStateView>(
    state: &mut S,
    deposit: &Deposit,
    epochs_ctx: &mut EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<DepositInvalid>> {
    verify_deposit_merkle_proof(state, deposit, state.eth1_deposit_index())?;
    // Deposits must be processed in order
    *state.eth1_deposit_index_mut() += 1;
    apply_deposit(state, &deposit.data, epochs_ctx, ctx)
}

/// Tops up a known validator, or registers a new one if the deposit signature holds.
///
/// A bad signature on a new deposit is not an error: the deposit contract already accepted the
/// funds, so the deposit is consumed without effect.
pub fn apply_deposit<S: BeaconStateView>(
    state: &mut S,
    deposit_data: &DepositData,
    epochs_ctx: &mut EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<DepositInvalid>> {
    let spec = ctx.spec;
    let amount = deposit_data.amount;
    if let Some(index) = get_existing_validator_index(state, epochs_ctx, &deposit_data.pubkey) {
        state.increase_balance(index, amount)?;
        return Ok(());
    }

    if !verify_deposit_signature(deposit_data, ctx) {
        debug!(
            pubkey = ?deposit_data.pubkey,
            amount, "Ignoring deposit with invalid signature"
        );
        return Ok(());
    }
    let index = state.validators().len() as u64;
    state.push_validator(
        Validator::from_deposit(
            deposit_data.pubkey.clone(),
            deposit_data.withdrawal_credentials,
            amount,
            spec.effective_balance_increment,
            spec.max_effective_balance,
        ),
        amount,
    )?;
    epochs_ctx
        .pubkey_cache
        .insert(index, deposit_data.pubkey.clone())?;
    Ok(())
}

pub fn process_voluntary_exit<S: BeaconStateView>(
    state: &mut S,
    signed_exit: &SignedVoluntaryExit,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<ExitInvalid>> {
    verify_exit(state, signed_exit, epochs_ctx, ctx)?;
    initiate_validator_exit(state, signed_exit.message.validator_index, ctx.spec)?;
    Ok(())
}
