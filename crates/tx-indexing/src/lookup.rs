//! # Transaction Lookup Service
//!
//! Resolves an identifier to bytes, telling apart three outcomes:
//!
//! 1. Not in the index: `NotFound`
//! 2. Indexed below the retention boundary: `Pruned`, without touching disk
//! 3. Indexed above the boundary but the read fails because the file is gone
//!    or short: also `Pruned`
//!
//! Step 3 covers the window between a file deletion and the boundary write
//! that follows it. The read is the final word.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use block_storage::{BlockStore, KeyValueStore, RetentionBoundary};
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{short_hex, BlockHash, TxId};
use tracing::debug;

use crate::domain::{
    IndexingError, LookupConfig, LookupError, LookupStats, MerkleProof, MerkleTree, TxIndexEntry,
};
use crate::index::TxIndex;
use crate::ports::inbound::TransactionLookupApi;

const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Default)]
struct Counters {
    found: AtomicU64,
    not_found: AtomicU64,
    pruned: AtomicU64,
    proofs_generated: AtomicU64,
}

pub struct TxLookupService<KV> {
    index: Arc<TxIndex<KV>>,
    boundary: Arc<RetentionBoundary>,
    blocks: Arc<dyn BlockStore>,
    trees: Mutex<LruCache<BlockHash, Arc<MerkleTree>>>,
    max_cached_trees: usize,
    counters: Counters,
}

impl<KV: KeyValueStore> TxLookupService<KV> {
    pub fn new(
        index: Arc<TxIndex<KV>>,
        boundary: Arc<RetentionBoundary>,
        blocks: Arc<dyn BlockStore>,
        config: LookupConfig,
    ) -> Self {
        let cache_size = NonZeroUsize::new(config.max_cached_trees).unwrap_or(DEFAULT_CACHE_SIZE);
        Self {
            index,
            boundary,
            blocks,
            trees: Mutex::new(LruCache::new(cache_size)),
            max_cached_trees: cache_size.get(),
            counters: Counters::default(),
        }
    }

    pub fn index(&self) -> &Arc<TxIndex<KV>> {
        &self.index
    }

    /// Index entry for `tx_id`, provided its block is still retained.
    pub fn get_entry(&self, tx_id: &TxId) -> Result<TxIndexEntry, LookupError> {
        let entry = self
            .index
            .lookup(tx_id)?
            .ok_or_else(|| self.not_found(tx_id))?;

        if !self.boundary.is_retained(entry.block_height) {
            return Err(self.pruned(&entry, "below retention boundary"));
        }
        Ok(entry)
    }

    /// Serialized bytes of `tx_id`.
    pub fn get_transaction(&self, tx_id: &TxId) -> Result<Vec<u8>, LookupError> {
        let entry = self.get_entry(tx_id)?;
        let bytes = self.read(&entry)?;
        self.counters.found.fetch_add(1, Ordering::Relaxed);
        debug!(tx = %short_hex(tx_id), height = entry.block_height, "transaction found");
        Ok(bytes)
    }

    /// Inclusion proof for `tx_id` in its block.
    ///
    /// The transaction's bytes must still be readable.
    pub fn get_merkle_proof(&self, tx_id: &TxId) -> Result<MerkleProof, LookupError> {
        let entry = self.get_entry(tx_id)?;
        self.read(&entry)?;

        let tree = self.tree_for(&entry)?;
        let proof = tree.generate_proof(entry.position as usize, entry.block_height, entry.block_hash)?;

        self.counters.found.fetch_add(1, Ordering::Relaxed);
        self.counters.proofs_generated.fetch_add(1, Ordering::Relaxed);
        debug!(
            tx = %short_hex(tx_id),
            height = entry.block_height,
            position = entry.position,
            "generated merkle proof"
        );
        Ok(proof)
    }

    pub fn stats(&self) -> Result<LookupStats, LookupError> {
        Ok(LookupStats {
            index: self.index.stats()?,
            retention_boundary: self.boundary.current(),
            cached_trees: self.trees.lock().len(),
            max_cached_trees: self.max_cached_trees,
            found: self.counters.found.load(Ordering::Relaxed),
            not_found: self.counters.not_found.load(Ordering::Relaxed),
            pruned: self.counters.pruned.load(Ordering::Relaxed),
            proofs_generated: self.counters.proofs_generated.load(Ordering::Relaxed),
        })
    }

    fn read(&self, entry: &TxIndexEntry) -> Result<Vec<u8>, LookupError> {
        match self.blocks.read_range(&entry.location) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_data_gone() => Err(self.pruned(entry, &e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn tree_for(&self, entry: &TxIndexEntry) -> Result<Arc<MerkleTree>, LookupError> {
        if let Some(tree) = self.trees.lock().get(&entry.block_hash) {
            return Ok(tree.clone());
        }

        let tx_ids = self.index.block_transactions(entry.block_height)?;
        let tree = Arc::new(MerkleTree::build(tx_ids));
        // A concurrent reorg can swap the block between the two reads.
        if tree.leaf(entry.position as usize) != Some(&entry.tx_id) {
            return Err(IndexingError::Corrupt {
                key: hex::encode(entry.block_hash),
                reason: "block membership changed during proof".into(),
            }
            .into());
        }

        self.trees.lock().put(entry.block_hash, tree.clone());
        Ok(tree)
    }

    fn not_found(&self, tx_id: &TxId) -> LookupError {
        self.counters.not_found.fetch_add(1, Ordering::Relaxed);
        debug!(tx = %short_hex(tx_id), "transaction not indexed");
        LookupError::NotFound { tx_id: *tx_id }
    }

    fn pruned(&self, entry: &TxIndexEntry, reason: &str) -> LookupError {
        self.counters.pruned.fetch_add(1, Ordering::Relaxed);
        debug!(
            tx = %short_hex(&entry.tx_id),
            height = entry.block_height,
            boundary = self.boundary.current(),
            reason,
            "transaction data pruned"
        );
        LookupError::Pruned {
            tx_id: entry.tx_id,
            block_height: entry.block_height,
        }
    }
}

impl<KV: KeyValueStore> TransactionLookupApi for TxLookupService<KV> {
    fn get_transaction(&self, tx_id: &TxId) -> Result<Vec<u8>, LookupError> {
        TxLookupService::get_transaction(self, tx_id)
    }

    fn get_entry(&self, tx_id: &TxId) -> Result<TxIndexEntry, LookupError> {
        TxLookupService::get_entry(self, tx_id)
    }

    fn get_merkle_proof(&self, tx_id: &TxId) -> Result<MerkleProof, LookupError> {
        TxLookupService::get_merkle_proof(self, tx_id)
    }

    fn stats(&self) -> Result<LookupStats, LookupError> {
        TxLookupService::stats(self)
    }
}
