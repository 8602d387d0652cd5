//! # Domain Layer
//!
//! Index entries, the on-store key layout, Merkle proofs and errors.

pub mod entities;
pub mod errors;
pub mod keys;
pub mod merkle;
pub mod value_objects;

pub use entities::{BestBlock, IndexStats, LookupStats, TxIndexEntry};
pub use errors::{IndexingError, LookupError};
pub use merkle::{MerkleProof, MerkleTree, ProofNode, SiblingPosition, SENTINEL_HASH};
pub use value_objects::LookupConfig;
