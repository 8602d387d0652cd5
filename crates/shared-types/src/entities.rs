//! # Core Entities
//!
//! Identifiers and on-disk locations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::HashParseError;

/// A 32-byte hash.
pub type Hash = [u8; 32];

/// Transaction identifier (double SHA-256 of the serialized transaction).
pub type TxId = Hash;

/// Block identifier.
pub type BlockHash = Hash;

/// Height of a block in the active chain (genesis = 0).
pub type BlockHeight = u64;

/// Identifier of one append-only block file (`blk00000.dat` is `FileId(0)`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct FileId(pub u32);

impl FileId {
    /// The file that follows this one in append order.
    pub fn next(self) -> Self {
        FileId(self.0 + 1)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk{:05}", self.0)
    }
}

/// Where a transaction's serialized bytes live.
///
/// Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionLocation {
    /// Block file holding the bytes.
    pub file_id: FileId,
    /// Byte offset of the first byte within the file.
    pub offset: u64,
    /// Number of bytes.
    pub length: u32,
}

impl TransactionLocation {
    pub const fn new(file_id: FileId, offset: u64, length: u32) -> Self {
        Self {
            file_id,
            offset,
            length,
        }
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }
}

/// Compute a transaction identifier from its serialized bytes.
pub fn tx_id_of(tx_bytes: &[u8]) -> TxId {
    let first = Sha256::digest(tx_bytes);
    Sha256::digest(first).into()
}

/// Abbreviated hex form for log lines (first 8 bytes).
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

/// Parse a 64-character hex string (optionally `0x`-prefixed) into a hash.
pub fn parse_hash(input: &str) -> Result<Hash, HashParseError> {
    let bytes = hex::decode(input.trim().trim_start_matches("0x"))
        .map_err(|e| HashParseError::InvalidHex(e.to_string()))?;

    let hash: Hash = bytes
        .as_slice()
        .try_into()
        .map_err(|_| HashParseError::WrongLength(bytes.len()))?;
    Ok(hash)
}
