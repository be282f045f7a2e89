//! `0x`-prefixed hex for 4-byte fork versions, as written in consensus config files.

use alloy_primitives::{aliases::B32, hex};
use serde::{Deserialize, Deserializer, Serializer, de::Error};

pub fn serialize<S>(version: &B32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode_prefixed(version))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<B32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    let stripped = value
        .strip_prefix("0x")
        .ok_or_else(|| D::Error::custom(format!("fork version {value} is missing 0x prefix")))?;
    let bytes = hex::decode(stripped).map_err(D::Error::custom)?;
    B32::try_from(bytes.as_slice()).map_err(D::Error::custom)
}
