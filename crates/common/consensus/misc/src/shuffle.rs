//! Swap-or-not shuffling, one index at a time or over a whole list.

use alloy_primitives::B256;
use anyhow::{anyhow, ensure};
use ethereum_hashing::hash;

use crate::misc::bytes_to_int64;

const SEED_SIZE: usize = 32;
const ROUND_SIZE: usize = 1;
const POSITION_WINDOW_SIZE: usize = 4;
const PIVOT_VIEW_SIZE: usize = SEED_SIZE + ROUND_SIZE;
const TOTAL_SIZE: usize = SEED_SIZE + ROUND_SIZE + POSITION_WINDOW_SIZE;

/// Return the shuffled index corresponding to ``seed`` (and ``index_count``).
pub fn compute_shuffled_index(
    mut index: usize,
    index_count: usize,
    seed: B256,
    rounds: u8,
) -> anyhow::Result<usize> {
    ensure!(index < index_count, "Index must be less than index_count");
    let mut buffer = [0u8; TOTAL_SIZE];
    buffer[..SEED_SIZE].copy_from_slice(seed.as_slice());
    for round in 0..rounds {
        buffer[SEED_SIZE] = round;
        let pivot =
            (bytes_to_int64(&hash(&buffer[..PIVOT_VIEW_SIZE])) % index_count as u64) as usize;

        let flip = (pivot + index_count - index) % index_count;
        let position = index.max(flip);
        buffer[PIVOT_VIEW_SIZE..].copy_from_slice(&((position / 256) as u32).to_le_bytes());
        let source = hash(&buffer);
        let byte = source[(position % 256) / 8];
        let bit = (byte >> (position % 8)) % 2;

        if bit == 1 {
            index = flip;
        }
    }
    Ok(index)
}

fn set_position_window(buffer: &mut [u8; TOTAL_SIZE], position: usize) -> Vec<u8> {
    buffer[PIVOT_VIEW_SIZE..].copy_from_slice(&((position >> 8) as u32).to_le_bytes());
    hash(&buffer[..])
}

/// Applies the swap-or-not network to a whole list at once.
///
/// With `forwards == false` the result satisfies
/// `output[i] == input[compute_shuffled_index(i, len, seed, rounds)]`, which is the ordering
/// committees are cut from. `forwards == true` is its inverse.
pub fn shuffle_list(
    mut input: Vec<u64>,
    rounds: u8,
    seed: B256,
    forwards: bool,
) -> anyhow::Result<Vec<u64>> {
    let list_size = input.len();
    ensure!(
        list_size > 0 && list_size <= 1 << 24,
        "Cannot shuffle a list of {list_size} elements"
    );
    if rounds == 0 {
        return Ok(input);
    }

    let mut buffer = [0u8; TOTAL_SIZE];
    buffer[..SEED_SIZE].copy_from_slice(seed.as_slice());

    let mut round = if forwards { 0 } else { rounds - 1 };
    loop {
        buffer[SEED_SIZE] = round;
        let pivot =
            (bytes_to_int64(&hash(&buffer[..PIVOT_VIEW_SIZE])) % list_size as u64) as usize;

        // Pairs mirrored around pivot / 2.
        let mirror = (pivot + 1) >> 1;
        let mut source = set_position_window(&mut buffer, pivot);
        let mut byte = source[(pivot & 0xff) >> 3];
        for i in 0..mirror {
            let j = pivot - i;
            if j & 0xff == 0xff {
                source = set_position_window(&mut buffer, j);
            }
            if j & 0x07 == 0x07 {
                byte = source[(j & 0xff) >> 3];
            }
            if (byte >> (j & 0x07)) & 0x01 == 1 {
                input.swap(i, j);
            }
        }

        // Pairs mirrored around (pivot + list_size) / 2.
        let mirror = (pivot + list_size + 1) >> 1;
        let end = list_size - 1;
        let mut source = set_position_window(&mut buffer, end);
        let mut byte = source[(end & 0xff) >> 3];
        for (offset, i) in ((pivot + 1)..mirror).enumerate() {
            let j = end - offset;
            if j & 0xff == 0xff {
                source = set_position_window(&mut buffer, j);
            }
            if j & 0x07 == 0x07 {
                byte = source[(j & 0xff) >> 3];
            }
            if (byte >> (j & 0x07)) & 0x01 == 1 {
                input.swap(i, j);
            }
        }

        if forwards {
            round += 1;
            if round == rounds {
                break;
            }
        } else {
            if round == 0 {
                break;
            }
            round -= 1;
        }
    }

    Ok(input)
}

/// Return the committee corresponding to ``indices``, ``seed``, ``index``, and committee ``count``.
pub fn compute_committee(
    indices: &[u64],
    seed: B256,
    index: u64,
    count: u64,
    rounds: u8,
) -> anyhow::Result<Vec<u64>> {
    let (start, end) = committee_bounds(indices.len(), index, count);
    (start..end)
        .map(|i| {
            let shuffled_index = compute_shuffled_index(i, indices.len(), seed, rounds)?;
            indices
                .get(shuffled_index)
                .copied()
                .ok_or_else(|| anyhow!("Index out of bounds: {shuffled_index}"))
        })
        .collect()
}

/// `[start, end)` of committee `index` out of `count` over `len` shuffled indices.
pub fn committee_bounds(len: usize, index: u64, count: u64) -> (usize, usize) {
    let len = len as u64;
    ((len * index / count) as usize, (len * (index + 1) / count) as usize)
}
