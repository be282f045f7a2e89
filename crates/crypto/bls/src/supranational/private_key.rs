use alloy_primitives::B256;
use blst::min_pk::SecretKey as BlstSecretKey;

use crate::{
    PrivateKey, constants::DST, errors::BLSError, pubkey::PubKey, signature::BLSSignature,
    traits::Signable,
};

impl PrivateKey {
    /// Derives a key from input keying material (at least 32 bytes) per the IETF BLS KeyGen.
    pub fn key_gen(ikm: &[u8]) -> Result<Self, BLSError> {
        let secret_key = BlstSecretKey::key_gen(ikm, &[]).map_err(BLSError::BlstError)?;
        Ok(Self {
            inner: B256::from(secret_key.to_bytes()),
        })
    }

    fn to_blst_secret_key(&self) -> Result<BlstSecretKey, BLSError> {
        BlstSecretKey::from_bytes(self.inner.as_slice()).map_err(|_| BLSError::InvalidPrivateKey)
    }

    pub fn public_key(&self) -> Result<PubKey, BLSError> {
        Ok(self.to_blst_secret_key()?.sk_to_pk().into())
    }
}

impl Signable for PrivateKey {
    type Error = BLSError;

    fn sign(&self, message: &[u8]) -> Result<BLSSignature, BLSError> {
        Ok(self.to_blst_secret_key()?.sign(message, DST, &[]).into())
    }
}
