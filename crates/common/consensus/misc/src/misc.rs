use alloy_primitives::{B256, aliases::B32};
use tree_hash::TreeHash;

use crate::{fork_data::ForkData, signing_data::SigningData};

pub fn compute_signing_root<SSZObject: TreeHash>(ssz_object: &SSZObject, domain: B256) -> B256 {
    SigningData {
        object_root: ssz_object.tree_hash_root(),
        domain,
    }
    .tree_hash_root()
}

/// Return the integer deserialization of the first 8 bytes of ``slice`` as little-endian.
pub fn bytes_to_int64(slice: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let len = slice.len().min(8);
    bytes[..len].copy_from_slice(&slice[..len]);
    u64::from_le_bytes(bytes)
}

/// Return the epoch number at ``slot``.
pub fn compute_epoch_at_slot(slot: u64, slots_per_epoch: u64) -> u64 {
    slot / slots_per_epoch
}

/// Return the start slot of ``epoch``.
pub fn compute_start_slot_at_epoch(epoch: u64, slots_per_epoch: u64) -> u64 {
    epoch * slots_per_epoch
}

/// Return the epoch during which validator activations and exits initiated in ``epoch`` take
/// effect.
pub fn compute_activation_exit_epoch(epoch: u64, max_seed_lookahead: u64) -> u64 {
    epoch + 1 + max_seed_lookahead
}

pub fn compute_fork_data_root(current_version: B32, genesis_validators_root: B256) -> B256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .compute_fork_data_root()
}

/// Return the domain for the ``domain_type`` and ``fork_version``.
pub fn compute_domain(
    domain_type: B32,
    fork_version: B32,
    genesis_validators_root: B256,
) -> B256 {
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);
    let mut domain = B256::ZERO;
    domain[..4].copy_from_slice(domain_type.as_slice());
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    domain
}

pub fn is_sorted_and_unique(indices: &[u64]) -> bool {
    indices.windows(2).all(|w| w[0] < w[1])
}

/// Return the largest integer ``x`` such that ``x**2 <= n``.
pub fn integer_squareroot(n: u64) -> u64 {
    if n == u64::MAX {
        return u32::MAX as u64;
    }
    let mut x = n;
    let mut y = x.div_ceil(2);
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

pub fn xor<T: AsRef<[u8]>>(bytes_1: T, bytes_2: T) -> B256 {
    let mut result = B256::ZERO;
    for (out, (a, b)) in result
        .iter_mut()
        .zip(bytes_1.as_ref().iter().zip(bytes_2.as_ref()))
    {
        *out = a ^ b;
    }
    result
}
