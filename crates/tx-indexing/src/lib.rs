//! # Transaction Indexing
//!
//! Maps transaction identifiers to the block and file region that hold them,
//! and answers lookups while block files are being pruned underneath.
//!
//! ```text
//! ChainEvent ──→ [TxIndex] ──atomic batch──→ KeyValueStore
//!                    │
//! query ──→ [TxLookupService] ──boundary check──→ RetentionBoundary
//!                    │
//!                    └──read_range──→ BlockStore
//! ```
//!
//! ## Lookup Outcomes
//!
//! | Outcome | When |
//! |---------|------|
//! | bytes | Indexed, retained, readable |
//! | `NotFound` | Never indexed, or retracted by a reorg |
//! | `Pruned` | Indexed, but below the boundary or the read hits a deleted file |
//!
//! The index is not rewritten when files are pruned. Entries for pruned
//! blocks stay so a caller can be told the data is gone rather than unknown.
//!
//! ## Hexagonal Architecture
//!
//! - **Domain Layer** (`domain/`): Entries, key layout, Merkle proofs
//! - **Ports Layer** (`ports/`): Inbound lookup API
//! - **Adapters Layer** (`adapters/`): JSON query handler

pub mod adapters;
pub mod domain;
pub mod index;
pub mod lookup;
pub mod ports;

pub use adapters::{
    handle_api_query, ApiGatewayHandler, ApiQueryError, ProofTarget, TxIndexMetrics,
};
pub use domain::{
    BestBlock, IndexStats, IndexingError, LookupConfig, LookupError, LookupStats, MerkleProof,
    MerkleTree, ProofNode, SiblingPosition, TxIndexEntry, SENTINEL_HASH,
};
pub use index::TxIndex;
pub use lookup::TxLookupService;
pub use ports::TransactionLookupApi;
