use ember_bls::BLSSignature;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitVector, typenum::U512};
use tree_hash_derive::TreeHash;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncAggregate {
    pub sync_committee_bits: BitVector<U512>,
    pub sync_committee_signature: BLSSignature,
}

impl Default for SyncAggregate {
    /// No participants, signed by nobody.
    fn default() -> Self {
        Self {
            sync_committee_bits: BitVector::new(),
            sync_committee_signature: BLSSignature::infinity(),
        }
    }
}

impl SyncAggregate {
    pub fn num_participants(&self) -> usize {
        self.sync_committee_bits.num_set_bits()
    }
}
