use thiserror::Error;

#[derive(Error, PartialEq, Debug)]
pub enum BLSError {
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid hex string")]
    InvalidHexString,
    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidByteLength { expected: usize, actual: usize },
    #[error("cannot aggregate an empty set of public keys")]
    EmptyAggregate,
    #[cfg(feature = "supranational")]
    #[error("blst error: {0:?}")]
    BlstError(blst::BLST_ERROR),
}
