//! # Merkle Inclusion Proofs
//!
//! Binary SHA3-256 tree over a block's transaction identifiers, in block
//! order. Leaves are padded with [`SENTINEL_HASH`] to a power of two (a
//! single transaction pads to two leaves).
//!
//! The tree is rebuilt from the index, not from block bytes, so proofs for a
//! retained block keep working no matter how the bytes are stored.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use shared_types::{BlockHash, BlockHeight, Hash, TxId};

use super::errors::IndexingError;

/// Padding leaf (all zeros).
pub const SENTINEL_HASH: Hash = [0u8; 32];

/// A binary Merkle tree stored in array form:
/// `[root, level1..., level2..., leaves...]`, children of `i` at `2i+1`, `2i+2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    nodes: Vec<Hash>,
    transaction_count: usize,
    padded_leaf_count: usize,
}

impl MerkleTree {
    pub fn build(tx_ids: Vec<TxId>) -> Self {
        let transaction_count = tx_ids.len();
        if transaction_count == 0 {
            return Self {
                nodes: vec![SENTINEL_HASH],
                transaction_count: 0,
                padded_leaf_count: 0,
            };
        }

        let padded_leaf_count = transaction_count.next_power_of_two().max(2);
        let leaf_start = padded_leaf_count - 1;

        let mut nodes = vec![SENTINEL_HASH; 2 * padded_leaf_count - 1];
        nodes[leaf_start..leaf_start + transaction_count].copy_from_slice(&tx_ids);

        for i in (0..leaf_start).rev() {
            nodes[i] = hash_pair(&nodes[2 * i + 1], &nodes[2 * i + 2]);
        }

        Self {
            nodes,
            transaction_count,
            padded_leaf_count,
        }
    }

    pub fn root(&self) -> Hash {
        self.nodes[0]
    }

    /// Number of real transactions (before padding).
    pub fn transaction_count(&self) -> usize {
        self.transaction_count
    }

    /// Number of leaves after padding.
    pub fn leaf_count(&self) -> usize {
        self.padded_leaf_count
    }

    /// Leaf at `position`, if it is a real transaction.
    pub fn leaf(&self, position: usize) -> Option<&Hash> {
        if position >= self.transaction_count {
            return None;
        }
        self.nodes.get(self.padded_leaf_count - 1 + position)
    }

    /// Inclusion proof for the transaction at `position`.
    pub fn generate_proof(
        &self,
        position: usize,
        block_height: BlockHeight,
        block_hash: BlockHash,
    ) -> Result<MerkleProof, IndexingError> {
        let invalid = IndexingError::InvalidIndex {
            index: position,
            max: self.transaction_count,
        };
        let leaf_hash = *self.leaf(position).ok_or(invalid)?;

        let mut current = self.padded_leaf_count - 1 + position;
        let mut path = Vec::with_capacity(self.padded_leaf_count.trailing_zeros() as usize);
        while current > 0 {
            // Right children sit at even indices.
            let (sibling, position) = if current % 2 == 0 {
                (current - 1, SiblingPosition::Left)
            } else {
                (current + 1, SiblingPosition::Right)
            };
            path.push(ProofNode {
                hash: self.nodes[sibling],
                position,
            });
            current = (current - 1) / 2;
        }

        Ok(MerkleProof {
            leaf_hash,
            tx_index: position,
            block_height,
            block_hash,
            root: self.root(),
            path,
        })
    }

    pub fn verify_proof(&self, proof: &MerkleProof) -> bool {
        proof.root == self.root() && proof.verify()
    }

    /// Recompute the root from a leaf and its path and compare.
    pub fn verify_proof_static(leaf_hash: &Hash, path: &[ProofNode], expected_root: &Hash) -> bool {
        let computed = path.iter().fold(*leaf_hash, |acc, node| match node.position {
            SiblingPosition::Left => hash_pair(&node.hash, &acc),
            SiblingPosition::Right => hash_pair(&acc, &node.hash),
        });
        computed == *expected_root
    }
}

/// parent = SHA3-256(left || right)
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Proof that a transaction is included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The transaction identifier being proven.
    pub leaf_hash: Hash,
    /// Position of the transaction in its block.
    pub tx_index: usize,
    pub block_height: BlockHeight,
    pub block_hash: BlockHash,
    /// Root the proof verifies against.
    pub root: Hash,
    /// Sibling hashes from leaf to root.
    pub path: Vec<ProofNode>,
}

impl MerkleProof {
    pub fn verify(&self) -> bool {
        MerkleTree::verify_proof_static(&self.leaf_hash, &self.path, &self.root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofNode {
    pub hash: Hash,
    pub position: SiblingPosition,
}

/// Position of a sibling in the Merkle tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiblingPosition {
    Left,
    Right,
}
