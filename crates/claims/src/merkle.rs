//! Sorted-Pair Merkle Tree
//!
//! Builds the claim tree the distributor verifies against. Sibling nodes are
//! ordered by value before hashing, so a proof is a plain list of sibling
//! hashes with no left/right position bits.
//!
//! # Conventions
//! These must match the on-chain verifier (OpenZeppelin `MerkleProof` and
//! merkletreejs with `sortPairs: true`):
//! - `node = keccak256(min(a, b) ‖ max(a, b))`, compared byte-wise
//! - an unmatched last node at any level is carried up unchanged, never
//!   duplicated, and contributes no proof element at that level
//! - a single leaf is its own root with an empty proof
//! - an empty tree has the root [`EMPTY_ROOT`]

use alloy_primitives::{keccak256, B256};

/// Root published for a round with no eligible accounts.
///
/// `bytes32(0)` is not a reachable keccak256 output for any non-empty leaf
/// set, and it is the distributor's "no root" value.
pub const EMPTY_ROOT: B256 = B256::ZERO;

/// Hash two nodes in sorted order.
#[must_use]
pub fn hash_sorted_pair(a: &B256, b: &B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

/// Fully materialized sorted-pair tree.
///
/// `layers[0]` holds the leaves in input order; the last layer holds the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    layers: Vec<Vec<B256>>,
}

impl MerkleTree {
    /// Build a tree over `leaves`, keeping their order.
    #[must_use]
    pub fn new(leaves: Vec<B256>) -> Self {
        let mut layers = vec![leaves];

        while layers.last().is_some_and(|level| level.len() > 1) {
            let level = &layers[layers.len() - 1];
            let next: Vec<B256> = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_sorted_pair(left, right),
                    [odd] => *odd,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            layers.push(next);
        }

        Self { layers }
    }

    /// Number of leaves
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    /// Whether the tree has no leaves
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    /// Leaves in input order
    #[must_use]
    pub fn leaves(&self) -> &[B256] {
        &self.layers[0]
    }

    /// Tree root, or [`EMPTY_ROOT`] when there are no leaves.
    #[must_use]
    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(EMPTY_ROOT)
    }

    /// Sibling path from leaf `index` up to the root.
    ///
    /// Returns `None` when `index` is out of range.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<Vec<B256>> {
        if index >= self.len() {
            return None;
        }

        let mut proof = Vec::with_capacity(self.layers.len().saturating_sub(1));
        let mut pos = index;

        for level in &self.layers[..self.layers.len() - 1] {
            // the carried-up odd node has no sibling
            if let Some(sibling) = level.get(pos ^ 1) {
                proof.push(*sibling);
            }
            pos /= 2;
        }

        Some(proof)
    }

    /// Proofs for every leaf, indexed like [`MerkleTree::leaves`].
    #[must_use]
    pub fn proofs(&self) -> Vec<Vec<B256>> {
        (0..self.len())
            .filter_map(|index| self.proof(index))
            .collect()
    }
}

/// Re-derive a root from a leaf and its proof.
#[must_use]
pub fn process_proof(leaf: B256, proof: &[B256]) -> B256 {
    proof
        .iter()
        .fold(leaf, |node, sibling| hash_sorted_pair(&node, sibling))
}

/// Check a proof against a root.
#[must_use]
pub fn verify(leaf: B256, proof: &[B256], root: B256) -> bool {
    process_proof(leaf, proof) == root
}
