/// Domain separation tag for the proof-of-possession ciphersuite used by the beacon chain.
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

pub const PUBKEY_BYTES_LEN: usize = 48;
pub const SIGNATURE_BYTES_LEN: usize = 96;

/// Compressed encoding of the point at infinity in G2.
pub const INFINITY_SIGNATURE_PREFIX: u8 = 0xc0;
