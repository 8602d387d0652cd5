//! # Domain Errors
//!
//! Error types for the transaction index and lookups.
//!
//! `LookupError::NotFound` and `LookupError::Pruned` are both permanent for
//! the query that produced them and are never retried. `Storage` is a
//! transient infrastructure fault.

use block_storage::{BlockStoreError, KVStoreError};
use shared_types::{short_hex, BlockHeight, TxId};
use thiserror::Error;

/// Errors from reading or writing the index store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexingError {
    /// A batch could not be written. Nothing from it was applied.
    #[error("index write failed: {message}")]
    StorageWriteFailure { message: String },

    /// The store could not be read.
    #[error("index read failed: {message}")]
    StorageReadFailure { message: String },

    /// A stored value could not be decoded.
    #[error("index entry {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    /// Proof requested for a position the tree does not have.
    #[error("invalid index {index} (max: {max})")]
    InvalidIndex { index: usize, max: usize },
}

impl IndexingError {
    pub(crate) fn write(err: KVStoreError) -> Self {
        IndexingError::StorageWriteFailure {
            message: err.to_string(),
        }
    }

    pub(crate) fn read(err: KVStoreError) -> Self {
        IndexingError::StorageReadFailure {
            message: err.to_string(),
        }
    }

    pub(crate) fn corrupt(key: &[u8], reason: impl ToString) -> Self {
        IndexingError::Corrupt {
            key: hex::encode(key),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a failed lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The identifier was never indexed.
    #[error("no such transaction {}", short_hex(.tx_id))]
    NotFound { tx_id: TxId },

    /// The transaction is indexed but its block data has been pruned.
    #[error("transaction {} at height {block_height} has been pruned", short_hex(.tx_id))]
    Pruned {
        tx_id: TxId,
        block_height: BlockHeight,
    },

    /// Index or block store failure.
    #[error("lookup failed: {message}")]
    Storage { message: String },
}

impl LookupError {
    /// Label used for the per-outcome lookup metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            LookupError::NotFound { .. } => "not_found",
            LookupError::Pruned { .. } => "pruned",
            LookupError::Storage { .. } => "storage_error",
        }
    }
}

impl From<IndexingError> for LookupError {
    fn from(err: IndexingError) -> Self {
        LookupError::Storage {
            message: err.to_string(),
        }
    }
}

impl From<BlockStoreError> for LookupError {
    fn from(err: BlockStoreError) -> Self {
        LookupError::Storage {
            message: err.to_string(),
        }
    }
}
