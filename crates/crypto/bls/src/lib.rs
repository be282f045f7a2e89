pub mod constants;
pub mod errors;
pub mod private_key;
pub mod pubkey;
pub mod signature;
pub mod traits;
pub mod verifier;

#[cfg(feature = "supranational")]
pub mod supranational;

pub use private_key::PrivateKey;
pub use pubkey::PubKey;
pub use signature::BLSSignature;
#[cfg(feature = "supranational")]
pub use verifier::BlstVerifier;
#[cfg(feature = "fake_crypto")]
pub use verifier::FakeVerifier;
pub use verifier::SignatureVerifier;
