//! https://ethereum.github.io/consensus-specs/ssz/merkle-proofs

use alloy_primitives::B256;

mod deposit_tree;
mod hash;

pub use deposit_tree::DepositTree;
use hash::hash_concat;

fn get_index_bit(index: u64, position: u64) -> bool {
    (index >> position) & 1 == 1
}

/// Check that `leaf` sits at `index` under `root` given the `depth` sibling hashes in `branch`.
pub fn is_valid_merkle_branch(
    leaf: B256,
    branch: &[B256],
    depth: u64,
    index: u64,
    root: B256,
) -> bool {
    if branch.len() < depth as usize {
        return false;
    }
    let mut value = leaf;
    for i in 0..depth {
        if get_index_bit(index, i) {
            value = hash_concat(branch[i as usize].as_slice(), value.as_slice());
        } else {
            value = hash_concat(value.as_slice(), branch[i as usize].as_slice());
        }
    }
    value == root
}
