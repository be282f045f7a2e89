use crate::{BLSSignature, PubKey};

pub trait Aggregatable<T> {
    type Error;

    fn aggregate(items: &[&T]) -> Result<T, Self::Error>;
}

pub trait Verifiable {
    type Error;

    /// Verifies a BLS signature against a public key and message.
    ///
    /// # Returns
    /// * `Ok(true)` if the signature is valid, `Ok(false)` if verification fails, or `Err` if the
    ///   signature or public key bytes do not decode to curve points
    fn verify(&self, pubkey: &PubKey, message: &[u8]) -> Result<bool, Self::Error>;

    /// Verifies the signature against a single message signed by every key in `pubkeys`.
    fn fast_aggregate_verify<'a, P>(&self, pubkeys: P, message: &[u8]) -> Result<bool, Self::Error>
    where
        P: AsRef<[&'a PubKey]>;
}

pub trait Signable {
    type Error;

    fn sign(&self, message: &[u8]) -> Result<BLSSignature, Self::Error>;
}
