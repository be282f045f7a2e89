use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::{
    constants::DOMAIN_BEACON_PROPOSER, misc::compute_signing_root,
    proposer_slashing::ProposerSlashing,
};

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{BlockOperationError, EpochContextError, ProposerSlashingInvalid as Invalid},
};

/// Indicates if a `ProposerSlashing` is valid to be included in a block in the current epoch of
/// the given state.
pub fn verify_proposer_slashing<S: BeaconStateView>(
    proposer_slashing: &ProposerSlashing,
    state: &S,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<Invalid>> {
    let spec = ctx.spec;
    let header_1 = &proposer_slashing.signed_header_1.message;
    let header_2 = &proposer_slashing.signed_header_2.message;

    // Verify header slots match
    verify!(
        header_1.slot == header_2.slot,
        Invalid::ProposalSlotMismatch(header_1.slot, header_2.slot)
    );
    // Verify header proposer indices match
    verify!(
        header_1.proposer_index == header_2.proposer_index,
        Invalid::ProposerIndexMismatch(header_1.proposer_index, header_2.proposer_index)
    );
    // Verify the headers are different
    verify!(header_1 != header_2, Invalid::ProposalsIdentical);

    // Verify the proposer is slashable
    let proposer_index = header_1.proposer_index;
    verify!(
        state
            .validator(proposer_index)?
            .is_slashable_validator(state.get_current_epoch(spec)),
        Invalid::ProposerNotSlashable(proposer_index)
    );

    // Verify signatures
    let pubkey = epochs_ctx
        .pubkey_cache
        .get_pubkey(proposer_index)
        .ok_or(EpochContextError::MissingPubkey(proposer_index))?;
    for (position, signed_header) in [
        &proposer_slashing.signed_header_1,
        &proposer_slashing.signed_header_2,
    ]
    .into_iter()
    .enumerate()
    {
        let domain = state.get_domain(
            DOMAIN_BEACON_PROPOSER,
            Some(spec.compute_epoch_at_slot(signed_header.message.slot)),
            spec,
        );
        let signing_root = compute_signing_root(&signed_header.message, domain);
        verify!(
            ctx.verifier.verify(
                &pubkey,
                signing_root.as_slice(),
                &signed_header.signature
            ),
            Invalid::BadProposal(position as u8 + 1)
        );
    }
    Ok(())
}
