//! # In-Memory Adapters
//!
//! Block files and a key-value store held in memory, for unit tests and the
//! devnet. Both expose hooks to inject the failures pruning has to survive.

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;
use shared_types::{BlockHeight, FileId, TransactionLocation};

use crate::domain::block_file::{encode_block_record, record_len, should_roll, BlockFileInfo};
use crate::domain::errors::{BlockStoreError, KVStoreError};
use crate::ports::outbound::{BatchOperation, BlockStore, BlockWriter, KeyValueStore, ScanResult};

// =============================================================================
// BLOCK STORE
// =============================================================================

#[derive(Default)]
struct MemoryFile {
    data: Vec<u8>,
    info: Option<BlockFileInfo>,
}

#[derive(Default)]
struct MemoryFiles {
    files: BTreeMap<FileId, MemoryFile>,
    current: Option<FileId>,
    next_id: FileId,
    failing_deletes: HashSet<FileId>,
}

/// Block files kept in memory, with the same record layout and roll-over
/// rule as [`FlatFileBlockStore`](super::FlatFileBlockStore).
pub struct InMemoryBlockStore {
    inner: RwLock<MemoryFiles>,
    preferred_file_size: u64,
}

impl InMemoryBlockStore {
    pub fn new(preferred_file_size: u64) -> Self {
        Self {
            inner: RwLock::new(MemoryFiles::default()),
            preferred_file_size,
        }
    }

    /// Make every `delete_file(file_id)` fail until cleared.
    pub fn fail_deletes_for(&self, file_id: FileId) {
        self.inner.write().failing_deletes.insert(file_id);
    }

    pub fn clear_delete_failures(&self) {
        self.inner.write().failing_deletes.clear();
    }

    /// Cut a file short, as an interrupted prune or a damaged disk would.
    pub fn truncate_file(&self, file_id: FileId, len: u64) {
        if let Some(file) = self.inner.write().files.get_mut(&file_id) {
            file.data.truncate(len as usize);
        }
    }

    /// Remove a file without going through the prune tracker.
    pub fn remove_file(&self, file_id: FileId) -> bool {
        let mut inner = self.inner.write();
        if inner.current == Some(file_id) {
            inner.current = None;
        }
        inner.files.remove(&file_id).is_some()
    }

    pub fn file_count(&self) -> usize {
        self.inner.read().files.len()
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new(128 << 20)
    }
}

impl BlockStore for InMemoryBlockStore {
    fn read_range(&self, location: &TransactionLocation) -> Result<Vec<u8>, BlockStoreError> {
        let inner = self.inner.read();
        let file = inner
            .files
            .get(&location.file_id)
            .ok_or(BlockStoreError::FileMissing {
                file_id: location.file_id,
            })?;

        let file_len = file.data.len() as u64;
        if location.end() > file_len {
            return Err(BlockStoreError::RegionUnreadable {
                file_id: location.file_id,
                offset: location.offset,
                end: location.end(),
                file_len,
            });
        }
        Ok(file.data[location.offset as usize..location.end() as usize].to_vec())
    }

    fn delete_file(&self, file_id: FileId) -> Result<u64, BlockStoreError> {
        let mut inner = self.inner.write();
        if inner.failing_deletes.contains(&file_id) {
            return Err(BlockStoreError::Io {
                message: format!("injected delete failure for {}", file_id),
            });
        }
        if inner.current == Some(file_id) {
            return Err(BlockStoreError::FileInUse { file_id });
        }
        Ok(inner
            .files
            .remove(&file_id)
            .map(|f| f.data.len() as u64)
            .unwrap_or(0))
    }

    fn block_files(&self) -> Result<Vec<BlockFileInfo>, BlockStoreError> {
        Ok(self
            .inner
            .read()
            .files
            .values()
            .filter_map(|f| f.info)
            .collect())
    }
}

impl BlockWriter for InMemoryBlockStore {
    fn append_block(
        &self,
        height: BlockHeight,
        transactions: &[Vec<u8>],
    ) -> Result<Vec<TransactionLocation>, BlockStoreError> {
        let len = record_len(transactions);
        let mut inner = self.inner.write();

        let current_size = inner
            .current
            .and_then(|id| inner.files.get(&id))
            .map(|f| f.data.len() as u64);
        let file_id = match (inner.current, current_size) {
            (Some(id), Some(size)) if !should_roll(size, len, self.preferred_file_size) => id,
            _ => {
                let id = inner.next_id;
                inner.next_id = id.next();
                inner.current = Some(id);
                inner.files.insert(id, MemoryFile::default());
                id
            }
        };

        let file = inner
            .files
            .get_mut(&file_id)
            .ok_or(BlockStoreError::FileMissing { file_id })?;
        let encoded = encode_block_record(file_id, file.data.len() as u64, height, transactions)?;
        file.data.extend_from_slice(&encoded.bytes);
        match file.info.as_mut() {
            Some(info) => info.add_block(height, len),
            None => file.info = Some(BlockFileInfo::new(file_id, height, len)),
        }
        Ok(encoded.locations)
    }
}

// =============================================================================
// KEY-VALUE STORE
// =============================================================================

/// In-memory key-value store for unit tests.
///
/// Ordered map, so prefix scans come back in key order like RocksDB's.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    fail_writes: bool,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail without applying anything.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_writable(&self) -> Result<(), KVStoreError> {
        if self.fail_writes {
            return Err(KVStoreError::IOError {
                message: "injected write failure".into(),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.check_writable()?;
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.check_writable()?;
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.check_writable()?;
        apply_batch(&mut self.data, operations);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(scan_prefix(&self.data, prefix))
    }
}

pub(crate) fn apply_batch(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operations: Vec<BatchOperation>) {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                data.insert(key, value);
            }
            BatchOperation::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

pub(crate) fn scan_prefix(data: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> ScanResult {
    data.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
