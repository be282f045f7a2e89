use crate::{BLSSignature, PubKey, errors::BLSError};

/// Signature checks the state transition delegates to.
///
/// Implementations answer `false` for anything that does not verify, including bytes that do not
/// decode to curve points. Only aggregation of public keys can fail with an error.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, pubkey: &PubKey, message: &[u8], signature: &BLSSignature) -> bool;

    fn fast_aggregate_verify(
        &self,
        pubkeys: &[&PubKey],
        message: &[u8],
        signature: &BLSSignature,
    ) -> bool;

    fn aggregate_pubkeys(&self, pubkeys: &[&PubKey]) -> Result<PubKey, BLSError>;
}

#[cfg(feature = "supranational")]
#[derive(Debug, Default, Clone, Copy)]
pub struct BlstVerifier;

#[cfg(feature = "supranational")]
impl SignatureVerifier for BlstVerifier {
    fn verify(&self, pubkey: &PubKey, message: &[u8], signature: &BLSSignature) -> bool {
        use crate::traits::Verifiable;

        signature.verify(pubkey, message).unwrap_or(false)
    }

    fn fast_aggregate_verify(
        &self,
        pubkeys: &[&PubKey],
        message: &[u8],
        signature: &BLSSignature,
    ) -> bool {
        use crate::traits::Verifiable;

        signature
            .fast_aggregate_verify(pubkeys, message)
            .unwrap_or(false)
    }

    fn aggregate_pubkeys(&self, pubkeys: &[&PubKey]) -> Result<PubKey, BLSError> {
        use crate::traits::Aggregatable;

        PubKey::aggregate(pubkeys)
    }
}

/// Verifier that skips all cryptography and answers with a fixed verdict.
#[cfg(feature = "fake_crypto")]
#[derive(Debug, Clone, Copy)]
pub struct FakeVerifier {
    pub valid: bool,
}

#[cfg(feature = "fake_crypto")]
impl Default for FakeVerifier {
    fn default() -> Self {
        Self { valid: true }
    }
}

#[cfg(feature = "fake_crypto")]
impl SignatureVerifier for FakeVerifier {
    fn verify(&self, _pubkey: &PubKey, _message: &[u8], _signature: &BLSSignature) -> bool {
        self.valid
    }

    fn fast_aggregate_verify(
        &self,
        _pubkeys: &[&PubKey],
        _message: &[u8],
        _signature: &BLSSignature,
    ) -> bool {
        self.valid
    }

    fn aggregate_pubkeys(&self, pubkeys: &[&PubKey]) -> Result<PubKey, BLSError> {
        pubkeys
            .first()
            .map(|pubkey| (*pubkey).clone())
            .ok_or(BLSError::EmptyAggregate)
    }
}
