use ember_consensus_beacon::view::BeaconStateView;
use ember_consensus_misc::{
    attestation::Attestation,
    constants::DOMAIN_BEACON_ATTESTER,
    indexed_attestation::IndexedAttestation,
    misc::{compute_signing_root, is_sorted_and_unique},
};
use ssz_types::{BitList, VariableList, typenum::U2048};

use crate::{
    context::TransitionContext,
    epoch_context::EpochsContext,
    errors::{AttestationInvalid, BlockOperationError, IndexedAttestationInvalid},
};

/// Return the set of attesting indices corresponding to ``aggregation_bits``, in committee order.
pub fn get_attesting_indices(
    committee: &[u64],
    aggregation_bits: &BitList<U2048>,
) -> Result<Vec<u64>, AttestationInvalid> {
    if aggregation_bits.len() != committee.len() {
        return Err(AttestationInvalid::BadAggregationBitfieldLength {
            committee_len: committee.len(),
            bitfield_len: aggregation_bits.len(),
        });
    }
    Ok(committee
        .iter()
        .enumerate()
        .filter(|(i, _)| aggregation_bits.get(*i).unwrap_or(false))
        .map(|(_, &index)| index)
        .collect())
}

/// Return the indexed attestation corresponding to ``attestation``.
pub fn get_indexed_attestation(
    committee: &[u64],
    attestation: &Attestation,
) -> Result<IndexedAttestation, AttestationInvalid> {
    let mut attesting_indices = get_attesting_indices(committee, &attestation.aggregation_bits)?;
    attesting_indices.sort_unstable();
    let bitfield_len = attestation.aggregation_bits.len();
    Ok(IndexedAttestation {
        attesting_indices: VariableList::new(attesting_indices).map_err(|_| {
            AttestationInvalid::BadAggregationBitfieldLength {
                committee_len: committee.len(),
                bitfield_len,
            }
        })?,
        data: attestation.data.clone(),
        signature: attestation.signature.clone(),
    })
}

/// Check if ``indexed_attestation`` is not empty, has sorted and unique indices and has a valid
/// aggregate signature.
pub fn is_valid_indexed_attestation<S: BeaconStateView>(
    state: &S,
    indexed_attestation: &IndexedAttestation,
    epochs_ctx: &EpochsContext,
    ctx: &TransitionContext,
) -> Result<(), BlockOperationError<IndexedAttestationInvalid>> {
    let indices = &indexed_attestation.attesting_indices;
    if indices.is_empty() {
        return Err(BlockOperationError::invalid(
            IndexedAttestationInvalid::IndicesEmpty,
        ));
    }
    if !is_sorted_and_unique(indices) {
        return Err(BlockOperationError::invalid(
            IndexedAttestationInvalid::BadValidatorIndicesOrdering,
        ));
    }

    let pubkeys = indices
        .iter()
        .map(|&index| {
            epochs_ctx
                .pubkey_cache
                .get_pubkey(index)
                .ok_or(IndexedAttestationInvalid::UnknownValidator(index))
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(BlockOperationError::invalid)?;
    let domain = state.get_domain(
        DOMAIN_BEACON_ATTESTER,
        Some(indexed_attestation.data.target.epoch),
        ctx.spec,
    );
    let signing_root = compute_signing_root(&indexed_attestation.data, domain);
    if !ctx.verifier.fast_aggregate_verify(
        &pubkeys.iter().collect::<Vec<_>>(),
        signing_root.as_slice(),
        &indexed_attestation.signature,
    ) {
        return Err(BlockOperationError::invalid(
            IndexedAttestationInvalid::BadSignature,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ember_bls::BLSSignature;
    use ember_consensus_misc::{attestation_data::AttestationData, checkpoint::Checkpoint};

    use super::*;

    fn bits(set: &[usize], len: usize) -> BitList<U2048> {
        let mut bits = BitList::with_capacity(len).unwrap();
        for &i in set {
            bits.set(i, true).unwrap();
        }
        bits
    }

    #[test]
    fn test_attesting_indices_follow_bits() {
        let committee = [40, 7, 19, 3];
        assert_eq!(
            get_attesting_indices(&committee, &bits(&[0, 3], 4)).unwrap(),
            vec![40, 3]
        );
        assert_eq!(
            get_attesting_indices(&committee, &bits(&[0], 5)),
            Err(AttestationInvalid::BadAggregationBitfieldLength {
                committee_len: 4,
                bitfield_len: 5
            })
        );
    }

    #[test]
    fn test_indexed_attestation_is_sorted() {
        let attestation = Attestation {
            aggregation_bits: bits(&[0, 1, 3], 4),
            data: AttestationData {
                slot: 1,
                index: 0,
                beacon_block_root: B256::ZERO,
                source: Checkpoint::default(),
                target: Checkpoint::default(),
            },
            signature: BLSSignature::infinity(),
        };
        let indexed = get_indexed_attestation(&[40, 7, 19, 3], &attestation).unwrap();
        assert_eq!(indexed.attesting_indices.to_vec(), vec![3, 7, 40]);
        assert_eq!(indexed.data, attestation.data);
    }
}
