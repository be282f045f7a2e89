use alloy_primitives::B256;
use anyhow::ensure;

use crate::hash::{hash_concat, zero_hashes};

/// Append-only sparse Merkle tree with the deposit contract's length mix-in.
///
/// Every level keeps only the nodes covered by the leaves pushed so far; absent right siblings
/// are the zero hash of that level, so pushes and proofs both cost `depth` hashes.
#[derive(Debug, Clone)]
pub struct DepositTree {
    depth: usize,
    layers: Vec<Vec<B256>>,
    zero_hashes: Vec<B256>,
}

impl DepositTree {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            layers: vec![vec![]; depth + 1],
            zero_hashes: zero_hashes(depth),
        }
    }

    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, level: usize, index: usize) -> B256 {
        self.layers[level]
            .get(index)
            .copied()
            .unwrap_or(self.zero_hashes[level])
    }

    pub fn push_leaf(&mut self, leaf: B256) -> anyhow::Result<()> {
        ensure!(
            self.len() < 1 << self.depth,
            "Deposit tree of depth {} is full",
            self.depth
        );
        let mut index = self.len();
        self.layers[0].push(leaf);
        for level in 0..self.depth {
            let left = self.node(level, index & !1);
            let right = self.node(level, index | 1);
            let parent = hash_concat(left.as_slice(), right.as_slice());
            index >>= 1;
            let layer = &mut self.layers[level + 1];
            if index < layer.len() {
                layer[index] = parent;
            } else {
                layer.push(parent);
            }
        }
        Ok(())
    }

    fn length_leaf(&self) -> B256 {
        let mut length = [0u8; 32];
        length[..8].copy_from_slice(&(self.len() as u64).to_le_bytes());
        B256::from(length)
    }

    /// Root of the tree mixed in with the number of leaves.
    pub fn root(&self) -> B256 {
        hash_concat(
            self.node(self.depth, 0).as_slice(),
            self.length_leaf().as_slice(),
        )
    }

    /// Sibling path for leaf `index` followed by the length leaf, `depth + 1` nodes in total.
    pub fn generate_proof(&self, index: usize) -> anyhow::Result<Vec<B256>> {
        ensure!(
            index < self.len(),
            "Leaf index {index} out of bounds for {} leaves",
            self.len()
        );
        let mut proof = Vec::with_capacity(self.depth + 1);
        for level in 0..self.depth {
            proof.push(self.node(level, (index >> level) ^ 1));
        }
        proof.push(self.length_leaf());
        Ok(proof)
    }
}
