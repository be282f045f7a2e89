use blst::min_pk::{AggregatePublicKey as BlstAggregatePublicKey, PublicKey as BlstPublicKey};
use ssz_types::FixedVector;

use crate::{errors::BLSError, pubkey::PubKey, traits::Aggregatable};

impl From<BlstPublicKey> for PubKey {
    fn from(value: BlstPublicKey) -> Self {
        PubKey {
            inner: FixedVector::from(value.to_bytes().to_vec()),
        }
    }
}

impl PubKey {
    pub fn to_blst_pubkey(&self) -> Result<BlstPublicKey, BLSError> {
        BlstPublicKey::from_bytes(&self.inner).map_err(BLSError::BlstError)
    }
}

impl Aggregatable<PubKey> for PubKey {
    type Error = BLSError;

    fn aggregate(pubkeys: &[&PubKey]) -> Result<PubKey, BLSError> {
        if pubkeys.is_empty() {
            return Err(BLSError::EmptyAggregate);
        }
        let pubkeys = pubkeys
            .iter()
            .map(|pubkey| pubkey.to_blst_pubkey())
            .collect::<Result<Vec<_>, _>>()?;
        let aggregate_pubkey =
            BlstAggregatePublicKey::aggregate(&pubkeys.iter().collect::<Vec<_>>(), true)
                .map_err(BLSError::BlstError)?;
        Ok(aggregate_pubkey.to_public_key().into())
    }
}
