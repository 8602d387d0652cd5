//! # Block Files
//!
//! Height ranges of block files and the record layout inside them.
//!
//! ## Record Layout
//!
//! ```text
//! [magic "TXB1"][height: u64 LE][tx_count: u32 LE]
//!     ([tx_len: u32 LE][tx bytes]) * tx_count
//! ```
//!
//! Records carry no checksum. A scan trusts the length framing and checks
//! only the magic.
//!
//! A [`TransactionLocation`] points at the tx bytes only, never at the
//! length prefix, so a read returns exactly the serialized transaction.

use serde::{Deserialize, Serialize};
use shared_types::{BlockHeight, FileId, TransactionLocation};
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use super::errors::BlockStoreError;

/// Magic bytes opening every block record.
pub const RECORD_MAGIC: [u8; 4] = *b"TXB1";

/// Bytes before the first transaction of a record.
pub const RECORD_HEADER_LEN: u64 = 16;

/// Length prefix before each transaction.
pub const TX_PREFIX_LEN: u64 = 4;

/// Height range and size of one block file.
///
/// Heights are not required to be contiguous: after a reorganization the
/// replacement blocks are appended to whatever file is current, so a file's
/// range can overlap an older file's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFileInfo {
    pub file_id: FileId,
    /// Lowest block height stored in the file.
    pub first_height: BlockHeight,
    /// Highest block height stored in the file.
    pub last_height: BlockHeight,
    pub block_count: u32,
    pub size_bytes: u64,
}

impl BlockFileInfo {
    /// Info for a file holding a single block record.
    pub fn new(file_id: FileId, height: BlockHeight, record_len: u64) -> Self {
        Self {
            file_id,
            first_height: height,
            last_height: height,
            block_count: 1,
            size_bytes: record_len,
        }
    }

    /// Account for another record appended to this file.
    pub fn add_block(&mut self, height: BlockHeight, record_len: u64) {
        self.first_height = self.first_height.min(height);
        self.last_height = self.last_height.max(height);
        self.block_count += 1;
        self.size_bytes += record_len;
    }

    /// Whether every block in the file is at or below `height`.
    pub fn entirely_at_or_below(&self, height: BlockHeight) -> bool {
        self.last_height <= height
    }
}

/// Decide whether a record of `record_len` bytes should start a new file.
///
/// An empty file always accepts the record, so an oversized block still
/// gets written.
pub fn should_roll(current_size: u64, record_len: u64, preferred_file_size: u64) -> bool {
    current_size > 0 && current_size + record_len > preferred_file_size
}

/// Serialized size of a block record.
pub fn record_len(transactions: &[Vec<u8>]) -> u64 {
    RECORD_HEADER_LEN
        + transactions
            .iter()
            .map(|tx| TX_PREFIX_LEN + tx.len() as u64)
            .sum::<u64>()
}

/// A block record ready to append, with the location of each transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    pub bytes: Vec<u8>,
    pub locations: Vec<TransactionLocation>,
}

/// Encode a block record that will be written at `base_offset` of `file_id`.
pub fn encode_block_record(
    file_id: FileId,
    base_offset: u64,
    height: BlockHeight,
    transactions: &[Vec<u8>],
) -> Result<EncodedBlock, BlockStoreError> {
    let tx_count =
        u32::try_from(transactions.len()).map_err(|_| BlockStoreError::BlockTooLarge { height })?;

    let mut bytes = Vec::with_capacity(record_len(transactions) as usize);
    bytes.extend_from_slice(&RECORD_MAGIC);
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.extend_from_slice(&tx_count.to_le_bytes());

    let mut locations = Vec::with_capacity(transactions.len());
    for tx in transactions {
        let length =
            u32::try_from(tx.len()).map_err(|_| BlockStoreError::BlockTooLarge { height })?;
        bytes.extend_from_slice(&length.to_le_bytes());
        let offset = base_offset + bytes.len() as u64;
        bytes.extend_from_slice(tx);
        locations.push(TransactionLocation::new(file_id, offset, length));
    }

    Ok(EncodedBlock { bytes, locations })
}

/// Result of scanning an existing block file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedFile {
    /// `None` when the file holds no complete record.
    pub info: Option<BlockFileInfo>,
    /// Length covered by complete records. Anything past it is a torn tail.
    pub valid_len: u64,
}

/// Walk the records of a block file to recover its height range.
///
/// A record cut short by a crash ends the scan; bytes after the last
/// complete record are reported through `valid_len` and not counted.
/// A record with the wrong magic is corruption.
pub fn scan_block_file<R: Read + Seek>(
    file_id: FileId,
    reader: &mut R,
    file_len: u64,
) -> Result<ScannedFile, BlockStoreError> {
    let mut info: Option<BlockFileInfo> = None;
    let mut cursor = 0u64;

    while cursor + RECORD_HEADER_LEN <= file_len {
        reader
            .seek(SeekFrom::Start(cursor))
            .map_err(BlockStoreError::io)?;

        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        if !read_or_eof(reader, &mut header)? {
            break;
        }
        if header[..4] != RECORD_MAGIC {
            return Err(BlockStoreError::Corrupt {
                file_id,
                reason: format!("bad record magic at offset {}", cursor),
            });
        }
        let height = u64::from_le_bytes(header[4..12].try_into().unwrap_or_default());
        let tx_count = u32::from_le_bytes(header[12..16].try_into().unwrap_or_default());

        let mut end = cursor + RECORD_HEADER_LEN;
        let mut complete = true;
        for _ in 0..tx_count {
            if end + TX_PREFIX_LEN > file_len {
                complete = false;
                break;
            }
            reader.seek(SeekFrom::Start(end)).map_err(BlockStoreError::io)?;
            let mut prefix = [0u8; TX_PREFIX_LEN as usize];
            if !read_or_eof(reader, &mut prefix)? {
                complete = false;
                break;
            }
            end += TX_PREFIX_LEN + u64::from(u32::from_le_bytes(prefix));
            if end > file_len {
                complete = false;
                break;
            }
        }
        if !complete {
            break;
        }

        let len = end - cursor;
        match info.as_mut() {
            Some(existing) => existing.add_block(height, len),
            None => info = Some(BlockFileInfo::new(file_id, height, len)),
        }
        cursor = end;
    }

    Ok(ScannedFile {
        info,
        valid_len: cursor,
    })
}

fn read_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, BlockStoreError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(BlockStoreError::io(e)),
    }
}
