//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the prune tracker, the retention boundary and
//! the transaction index.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHeight, FileId, TransactionLocation};

use crate::domain::block_file::BlockFileInfo;
use crate::domain::errors::{BlockStoreError, KVStoreError};

/// Rows returned by [`KeyValueStore::prefix_scan`].
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Read, delete and enumerate block files.
///
/// Production: `FlatFileBlockStore` (adapters/flat_file.rs)
/// Testing: `InMemoryBlockStore` (adapters/memory.rs)
///
/// Implementations must be safe to call from readers and the prune worker at
/// the same time. A read racing a deletion fails with `FileMissing` or
/// `RegionUnreadable`, never with partial bytes.
pub trait BlockStore: Send + Sync {
    /// Read exactly `location.length` bytes at `location.offset`.
    fn read_range(&self, location: &TransactionLocation) -> Result<Vec<u8>, BlockStoreError>;

    /// Delete a whole block file, returning the bytes reclaimed.
    ///
    /// Deleting a file that is already gone succeeds with 0 bytes.
    fn delete_file(&self, file_id: FileId) -> Result<u64, BlockStoreError>;

    /// Height range of every block file still on disk.
    fn block_files(&self) -> Result<Vec<BlockFileInfo>, BlockStoreError>;
}

/// Append side of a block store, used by the chain-state feeder.
pub trait BlockWriter: BlockStore {
    /// Append one block's transactions, returning their locations in order.
    fn append_block(
        &self,
        height: BlockHeight,
        transactions: &[Vec<u8>],
    ) -> Result<Vec<TransactionLocation>, BlockStoreError>;
}

/// Abstract interface for key-value database operations.
///
/// Production: `FileBackedKVStore` (adapters/kv_file.rs) or `RocksDbStore`
/// (node-runtime, `rocksdb` feature)
/// Testing: `InMemoryKVStore` (adapters/memory.rs)
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch are applied, in order, or NONE are.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError>;

    /// All pairs whose key starts with `prefix`, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError>;

    /// Make every acknowledged write durable.
    fn flush(&mut self) -> Result<(), KVStoreError> {
        Ok(())
    }
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            BatchOperation::Put { key, .. } | BatchOperation::Delete { key } => key,
        }
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        (**self).get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        (**self).put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        (**self).delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        (**self).atomic_batch_write(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        (**self).exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        (**self).prefix_scan(prefix)
    }

    fn flush(&mut self) -> Result<(), KVStoreError> {
        (**self).flush()
    }
}
