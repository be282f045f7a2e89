use alloy_primitives::B256;

/// Common hashing function for Merkle trees.
pub(crate) fn hash_concat(h1: &[u8], h2: &[u8]) -> B256 {
    ethereum_hashing::hash32_concat(h1, h2).into()
}

/// `zero_hashes[i]` is the root of a depth-`i` tree whose leaves are all zero.
pub(crate) fn zero_hashes(depth: usize) -> Vec<B256> {
    let mut hashes = vec![B256::ZERO; depth + 1];
    for i in 0..depth {
        hashes[i + 1] = hash_concat(hashes[i].as_slice(), hashes[i].as_slice());
    }
    hashes
}
