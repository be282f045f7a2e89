use std::str::FromStr;

use alloy_primitives::hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, typenum::U48};
use tree_hash_derive::TreeHash;

use crate::{constants::PUBKEY_BYTES_LEN, errors::BLSError};

#[derive(Debug, PartialEq, Clone, Encode, Decode, TreeHash, Default, Eq, Hash)]
pub struct PubKey {
    pub inner: FixedVector<u8, U48>,
}

impl Serialize for PubKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.to_bytes())))
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let result: String = Deserialize::deserialize(deserializer)?;
        PubKey::from_str(&result).map_err(serde::de::Error::custom)
    }
}

impl PubKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BLSError> {
        if bytes.len() != PUBKEY_BYTES_LEN {
            return Err(BLSError::InvalidByteLength {
                expected: PUBKEY_BYTES_LEN,
                actual: bytes.len(),
            });
        }
        Ok(PubKey {
            inner: FixedVector::from(bytes.to_vec()),
        })
    }

    pub fn to_bytes(&self) -> &[u8] {
        self.inner.iter().as_slice()
    }
}

impl FromStr for PubKey {
    type Err = BLSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(clean_str).map_err(|_| BLSError::InvalidHexString)?;
        PubKey::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_pubkey_hex_round_trip_through_serde() {
        let pubkey = PubKey::from_bytes(&[0xab; 48]).expect("valid length");
        let json = serde_json::to_string(&pubkey).expect("serialize");
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(48)));
        let decoded: PubKey = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, pubkey);
    }

    #[rstest]
    #[case::too_short("0x1234", BLSError::InvalidByteLength { expected: 48, actual: 2 })]
    #[case::empty("0x", BLSError::InvalidByteLength { expected: 48, actual: 0 })]
    #[case::not_hex("0xzz", BLSError::InvalidHexString)]
    fn test_pubkey_rejects_malformed_input(#[case] input: &str, #[case] expected: BLSError) {
        assert_eq!(PubKey::from_str(input), Err(expected));
    }
}
