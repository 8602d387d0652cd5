//! # File-Backed Key-Value Store
//!
//! Durable store for development nodes without RocksDB. Every batch is one
//! checksummed record appended to a log; the map is rebuilt by replaying the
//! log on open.
//!
//! ## Record Layout
//!
//! ```text
//! [payload_len: u32 LE][crc32(payload): u32 LE][payload: bincode(Vec<BatchOperation>)]
//! ```
//!
//! A batch is applied on replay only if its whole record is present and the
//! checksum matches, which is what makes `atomic_batch_write` all-or-nothing
//! across crashes. Replay stops at the first bad record and the log is cut
//! there.
//!
//! A failed append is cut back to the last record boundary before the error
//! is returned. If that cut fails too the store refuses writes until a later
//! attempt manages it, so nothing is ever appended behind a partial record.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::memory::{apply_batch, scan_prefix};
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};

const RECORD_HEADER_LEN: usize = 8;

/// Append-log key-value store.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
    log: File,
    log_len: u64,
    /// The log may hold a partial record past `log_len`.
    torn: bool,
}

impl FileBackedKVStore {
    /// Open the log at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut bytes = Vec::new();
        match File::open(&path) {
            Ok(mut file) => {
                file.read_to_end(&mut bytes)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let (data, valid_len, batches) = replay(&bytes);
        let log = OpenOptions::new().create(true).append(true).open(&path)?;
        if (valid_len as usize) < bytes.len() {
            warn!(
                path = %path.display(),
                log_len = bytes.len(),
                valid_len,
                "discarding incomplete tail of key-value log"
            );
            log.set_len(valid_len)?;
            log.sync_all()?;
        }

        info!(
            path = %path.display(),
            keys = data.len(),
            batches,
            "loaded key-value log"
        );

        Ok(Self {
            data,
            path,
            log,
            log_len: valid_len,
            torn: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the log on disk.
    pub fn log_len(&self) -> u64 {
        self.log_len
    }

    /// Rewrite the log as a single batch holding the current contents.
    ///
    /// Written to a temp file and renamed over the log.
    pub fn compact(&mut self) -> Result<(), KVStoreError> {
        let snapshot: Vec<BatchOperation> = self
            .data
            .iter()
            .map(|(k, v)| BatchOperation::put(k.clone(), v.clone()))
            .collect();
        let record = encode_record(&snapshot)?;

        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(&record)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        self.log = OpenOptions::new().append(true).open(&self.path)?;
        let before = self.log_len;
        self.log_len = record.len() as u64;
        self.torn = false;
        info!(
            path = %self.path.display(),
            before,
            after = self.log_len,
            "compacted key-value log"
        );
        Ok(())
    }

    fn append(&mut self, operations: &[BatchOperation]) -> Result<(), KVStoreError> {
        if self.torn {
            self.cut_to_boundary()?;
            warn!(
                path = %self.path.display(),
                log_len = self.log_len,
                "cut partial record from key-value log"
            );
        }

        let record = encode_record(operations)?;
        let written = self
            .log
            .write_all(&record)
            .and_then(|()| self.log.sync_data());
        if let Err(e) = written {
            self.torn = true;
            if let Err(cut) = self.cut_to_boundary() {
                error!(
                    path = %self.path.display(),
                    error = %cut,
                    "failed to cut partial record, refusing writes until it succeeds"
                );
            }
            return Err(e.into());
        }
        self.log_len += record.len() as u64;
        Ok(())
    }

    /// Truncate the log to the last complete record.
    fn cut_to_boundary(&mut self) -> Result<(), KVStoreError> {
        self.log
            .set_len(self.log_len)
            .and_then(|()| self.log.sync_data())
            .map_err(|e| KVStoreError::IOError {
                message: format!(
                    "key-value log has a partial record past byte {}: {}",
                    self.log_len, e
                ),
            })?;
        self.torn = false;
        Ok(())
    }
}

fn encode_record(operations: &[BatchOperation]) -> Result<Vec<u8>, KVStoreError> {
    let payload = bincode::serialize(operations).map_err(|e| KVStoreError::IOError {
        message: format!("failed to encode batch: {}", e),
    })?;
    let payload_len = u32::try_from(payload.len()).map_err(|_| KVStoreError::IOError {
        message: format!("batch of {} bytes is too large", payload.len()),
    })?;

    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
    record.extend_from_slice(&payload_len.to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    record.extend_from_slice(&payload);
    Ok(record)
}

/// Replay complete records, returning the map, the valid prefix length, and
/// the number of batches applied.
fn replay(bytes: &[u8]) -> (BTreeMap<Vec<u8>, Vec<u8>>, u64, usize) {
    let mut data = BTreeMap::new();
    let mut cursor = 0usize;
    let mut batches = 0usize;

    while cursor + RECORD_HEADER_LEN <= bytes.len() {
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[cursor..cursor + 4]);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&bytes[cursor + 4..cursor + 8]);

        let start = cursor + RECORD_HEADER_LEN;
        let end = start + u32::from_le_bytes(len_bytes) as usize;
        if end > bytes.len() {
            break;
        }
        let payload = &bytes[start..end];
        if crc32fast::hash(payload) != u32::from_le_bytes(crc_bytes) {
            break;
        }
        let Ok(operations) = bincode::deserialize::<Vec<BatchOperation>>(payload) else {
            break;
        };

        apply_batch(&mut data, operations);
        batches += 1;
        cursor = end;
    }

    (data, cursor as u64, batches)
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::put(key, value)])
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::delete(key)])
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        if operations.is_empty() {
            return Ok(());
        }
        self.append(&operations)?;
        apply_batch(&mut self.data, operations);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(scan_prefix(&self.data, prefix))
    }

    fn flush(&mut self) -> Result<(), KVStoreError> {
        self.log.sync_all()?;
        Ok(())
    }
}
