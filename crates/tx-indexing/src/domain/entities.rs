//! # Domain Entities
//!
//! Index entries and bookkeeping records.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHash, BlockHeight, TransactionLocation, TxId};

/// Where an indexed transaction lives and which block contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIndexEntry {
    pub tx_id: TxId,
    pub location: TransactionLocation,
    pub block_height: BlockHeight,
    pub block_hash: BlockHash,
    /// Ordinal of the transaction inside its block.
    pub position: u32,
}

/// The last block the index applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestBlock {
    pub height: BlockHeight,
    pub block_hash: BlockHash,
}

/// Statistics about the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Identifiers currently mapped.
    pub indexed_transactions: u64,
    pub best_block: Option<BestBlock>,
}

/// Statistics about the lookup service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    pub index: IndexStats,
    pub retention_boundary: BlockHeight,
    pub cached_trees: usize,
    pub max_cached_trees: usize,
    pub found: u64,
    pub not_found: u64,
    pub pruned: u64,
    pub proofs_generated: u64,
}
