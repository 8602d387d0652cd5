//! # Transaction Index
//!
//! Persistent `txid -> TxIndexEntry` map on top of a [`KeyValueStore`].
//!
//! Every mutation is a single atomic batch built and written under the
//! store's write lock, so a reader sees a block either completely indexed or
//! not at all. Within a batch all deletes precede all puts; an identifier is
//! never mapped to an old and a new location at once.
//!
//! The index never reads block data. Whether an entry's bytes still exist is
//! the lookup service's concern.

use std::collections::{BTreeMap, HashSet};

use block_storage::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use shared_types::{short_hex, BlockHash, BlockHeight, IndexedTransaction, TxId};
use tracing::{debug, info};

use crate::domain::keys::{
    block_hash_key, membership_key, membership_prefix, tx_key, BEST_KEY, COUNT_KEY,
};
use crate::domain::{BestBlock, IndexStats, IndexingError, TxIndexEntry};

pub struct TxIndex<KV> {
    store: RwLock<KV>,
}

/// Deletes and puts collected for one batch.
#[derive(Default)]
struct BatchPlan {
    deletes: Vec<Vec<u8>>,
    puts: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Identifiers whose entry the plan already deletes.
    retracted: HashSet<TxId>,
    count_delta: i64,
}

impl BatchPlan {
    fn into_operations(self) -> Vec<BatchOperation> {
        let mut ops: Vec<_> = self.deletes.into_iter().map(BatchOperation::delete).collect();
        ops.extend(
            self.puts
                .into_iter()
                .map(|(key, value)| BatchOperation::put(key, value)),
        );
        ops
    }
}

impl<KV: KeyValueStore> TxIndex<KV> {
    pub fn new(store: KV) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Index every transaction of a connected block.
    ///
    /// An identifier already indexed at another height is moved to this
    /// block; the other block's membership rows are left intact so its
    /// Merkle tree still has every leaf. Returns the number of entries
    /// written.
    pub fn record(
        &self,
        height: BlockHeight,
        block_hash: BlockHash,
        transactions: &[IndexedTransaction],
    ) -> Result<usize, IndexingError> {
        let mut store = self.store.write();
        let mut plan = BatchPlan::default();
        plan_insert(&*store, &mut plan, height, block_hash, transactions)?;
        commit(&mut *store, plan)?;

        debug!(
            height,
            block = %short_hex(&block_hash),
            transactions = transactions.len(),
            "indexed block"
        );
        Ok(transactions.len())
    }

    /// Look up an identifier. Says nothing about whether its bytes exist.
    pub fn lookup(&self, tx_id: &TxId) -> Result<Option<TxIndexEntry>, IndexingError> {
        read_entry(&*self.store.read(), tx_id)
    }

    /// Retract the block at `height`. Entries that have since moved to
    /// another height are left alone. Returns the number of entries removed.
    pub fn remove(&self, height: BlockHeight) -> Result<usize, IndexingError> {
        let mut store = self.store.write();
        let mut plan = BatchPlan::default();
        let removed = plan_retract(&*store, &mut plan, height)?;

        match height.checked_sub(1) {
            Some(parent) => match read_block_hash(&*store, parent)? {
                Some(block_hash) => {
                    plan.puts.insert(
                        BEST_KEY.to_vec(),
                        encode(&BestBlock {
                            height: parent,
                            block_hash,
                        })?,
                    );
                }
                None => plan.deletes.push(BEST_KEY.to_vec()),
            },
            None => plan.deletes.push(BEST_KEY.to_vec()),
        }
        commit(&mut *store, plan)?;

        info!(height, removed, "retracted block from index");
        Ok(removed)
    }

    /// Replace the block at `height` with another block in one batch.
    pub fn rewrite(
        &self,
        height: BlockHeight,
        block_hash: BlockHash,
        transactions: &[IndexedTransaction],
    ) -> Result<usize, IndexingError> {
        let mut store = self.store.write();
        let mut plan = BatchPlan::default();
        let removed = plan_retract(&*store, &mut plan, height)?;
        plan_insert(&*store, &mut plan, height, block_hash, transactions)?;
        commit(&mut *store, plan)?;

        info!(
            height,
            block = %short_hex(&block_hash),
            removed,
            inserted = transactions.len(),
            "rewrote block in index"
        );
        Ok(transactions.len())
    }

    /// Identifiers of the block at `height`, in block order.
    pub fn block_transactions(&self, height: BlockHeight) -> Result<Vec<TxId>, IndexingError> {
        let store = self.store.read();
        let rows = store
            .prefix_scan(&membership_prefix(height))
            .map_err(IndexingError::read)?;
        rows.into_iter()
            .map(|(key, value)| decode_tx_id(&key, &value))
            .collect()
    }

    pub fn best_block(&self) -> Result<Option<BestBlock>, IndexingError> {
        read_best(&*self.store.read())
    }

    pub fn stats(&self) -> Result<IndexStats, IndexingError> {
        let store = self.store.read();
        Ok(IndexStats {
            indexed_transactions: read_count(&*store)?,
            best_block: read_best(&*store)?,
        })
    }

    pub fn flush(&self) -> Result<(), IndexingError> {
        self.store.write().flush().map_err(IndexingError::write)
    }

    /// Run `f` with exclusive access to the underlying store.
    pub fn with_store_mut<R>(&self, f: impl FnOnce(&mut KV) -> R) -> R {
        f(&mut *self.store.write())
    }
}

// =============================================================================
// BATCH PLANNING
// =============================================================================

fn plan_retract<KV: KeyValueStore>(
    store: &KV,
    plan: &mut BatchPlan,
    height: BlockHeight,
) -> Result<usize, IndexingError> {
    let rows = store
        .prefix_scan(&membership_prefix(height))
        .map_err(IndexingError::read)?;

    let mut removed = 0;
    for (key, value) in rows {
        let tx_id = decode_tx_id(&key, &value)?;
        if let Some(entry) = read_entry(store, &tx_id)? {
            if entry.block_height == height && plan.retracted.insert(tx_id) {
                plan.deletes.push(tx_key(&tx_id));
                plan.count_delta -= 1;
                removed += 1;
            }
        }
        plan.deletes.push(key);
    }
    plan.deletes.push(block_hash_key(height));
    Ok(removed)
}

fn plan_insert<KV: KeyValueStore>(
    store: &KV,
    plan: &mut BatchPlan,
    height: BlockHeight,
    block_hash: BlockHash,
    transactions: &[IndexedTransaction],
) -> Result<(), IndexingError> {
    let mut seen = HashSet::with_capacity(transactions.len());

    for (position, tx) in transactions.iter().enumerate() {
        let position = u32::try_from(position).map_err(|_| IndexingError::InvalidIndex {
            index: position,
            max: u32::MAX as usize,
        })?;

        let first_in_batch = seen.insert(tx.tx_id);
        // A re-recorded identifier keeps its membership row in the earlier
        // block; that row describes the block, not the entry.
        let counted = first_in_batch
            && (plan.retracted.contains(&tx.tx_id) || read_entry(store, &tx.tx_id)?.is_none());
        if counted {
            plan.count_delta += 1;
        }

        let entry = TxIndexEntry {
            tx_id: tx.tx_id,
            location: tx.location,
            block_height: height,
            block_hash,
            position,
        };
        plan.puts.insert(tx_key(&tx.tx_id), encode(&entry)?);
        plan.puts
            .insert(membership_key(height, position), tx.tx_id.to_vec());
    }

    plan.puts
        .insert(block_hash_key(height), block_hash.to_vec());
    plan.puts.insert(
        BEST_KEY.to_vec(),
        encode(&BestBlock { height, block_hash })?,
    );
    Ok(())
}

fn commit<KV: KeyValueStore>(store: &mut KV, mut plan: BatchPlan) -> Result<(), IndexingError> {
    let count = read_count(store)?;
    let updated = if plan.count_delta >= 0 {
        count.saturating_add(plan.count_delta as u64)
    } else {
        count.saturating_sub(plan.count_delta.unsigned_abs())
    };
    plan.puts
        .insert(COUNT_KEY.to_vec(), updated.to_le_bytes().to_vec());

    store
        .atomic_batch_write(plan.into_operations())
        .map_err(IndexingError::write)
}

// =============================================================================
// DECODING
// =============================================================================

fn read_entry<KV: KeyValueStore>(
    store: &KV,
    tx_id: &TxId,
) -> Result<Option<TxIndexEntry>, IndexingError> {
    let key = tx_key(tx_id);
    match store.get(&key).map_err(IndexingError::read)? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| IndexingError::corrupt(&key, e)),
        None => Ok(None),
    }
}

fn read_best<KV: KeyValueStore>(store: &KV) -> Result<Option<BestBlock>, IndexingError> {
    match store.get(BEST_KEY).map_err(IndexingError::read)? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| IndexingError::corrupt(BEST_KEY, e)),
        None => Ok(None),
    }
}

fn read_block_hash<KV: KeyValueStore>(
    store: &KV,
    height: BlockHeight,
) -> Result<Option<BlockHash>, IndexingError> {
    let key = block_hash_key(height);
    match store.get(&key).map_err(IndexingError::read)? {
        Some(bytes) => decode_tx_id(&key, &bytes).map(Some),
        None => Ok(None),
    }
}

fn read_count<KV: KeyValueStore>(store: &KV) -> Result<u64, IndexingError> {
    match store.get(COUNT_KEY).map_err(IndexingError::read)? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| IndexingError::corrupt(COUNT_KEY, "expected 8 bytes"))?;
            Ok(u64::from_le_bytes(raw))
        }
        None => Ok(0),
    }
}

fn decode_tx_id(key: &[u8], value: &[u8]) -> Result<TxId, IndexingError> {
    value
        .try_into()
        .map_err(|_| IndexingError::corrupt(key, format!("expected 32 bytes, got {}", value.len())))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, IndexingError> {
    bincode::serialize(value).map_err(|e| IndexingError::StorageWriteFailure {
        message: format!("failed to encode index value: {}", e),
    })
}
