//! # Domain Errors
//!
//! Error types for the block storage subsystem.
//!
//! `FileMissing` and `RegionUnreadable` are the two ways a location can stop
//! being readable after pruning. Callers that only need to know "is the data
//! gone" use [`BlockStoreError::is_data_gone`] instead of matching both.

use shared_types::{BlockHeight, FileId};
use thiserror::Error;

/// Errors from reading, writing or deleting block files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockStoreError {
    /// The file no longer exists (pruned or never written).
    #[error("block file {file_id} is missing")]
    FileMissing { file_id: FileId },

    /// The file exists but does not cover the requested byte range.
    #[error("range {offset}..{end} of {file_id} is unreadable (file length {file_len})")]
    RegionUnreadable {
        file_id: FileId,
        offset: u64,
        end: u64,
        file_len: u64,
    },

    /// The file is the active write target and cannot be deleted.
    #[error("block file {file_id} is in use")]
    FileInUse { file_id: FileId },

    /// A block record failed to parse while scanning a file.
    #[error("block file {file_id} is corrupt: {reason}")]
    Corrupt { file_id: FileId, reason: String },

    /// A single block record does not fit the 32-bit length fields.
    #[error("block at height {height} is too large to encode")]
    BlockTooLarge { height: BlockHeight },

    /// Any other I/O failure.
    #[error("block store I/O error: {message}")]
    Io { message: String },
}

impl BlockStoreError {
    /// Whether the error means the requested bytes are gone from disk.
    pub fn is_data_gone(&self) -> bool {
        matches!(
            self,
            BlockStoreError::FileMissing { .. } | BlockStoreError::RegionUnreadable { .. }
        )
    }

    pub(crate) fn io(err: std::io::Error) -> Self {
        BlockStoreError::Io {
            message: err.to_string(),
        }
    }
}

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },
}

impl From<std::io::Error> for KVStoreError {
    fn from(err: std::io::Error) -> Self {
        KVStoreError::IOError {
            message: err.to_string(),
        }
    }
}

/// Errors from configuring or running the pruner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PruneError {
    /// Retention depth is below the node's hard minimum.
    #[error("retention depth {requested} is below the minimum of {minimum} blocks")]
    RetentionTooShallow { requested: u64, minimum: u64 },

    /// The minimum number of blocks to keep must be positive.
    #[error("minimum blocks to keep must be at least 1")]
    InvalidMinimum,

    /// A manual prune was requested on a node that is not in prune mode.
    #[error("cannot prune blocks because the node is not in prune mode")]
    PruningDisabled,

    /// Writing the retention boundary failed.
    #[error("failed to persist retention boundary: {0}")]
    BoundaryPersist(KVStoreError),

    /// The persisted boundary value has an unexpected encoding.
    #[error("persisted retention boundary has unexpected length {len}")]
    BoundaryCorrupt { len: usize },

    /// Listing block files failed.
    #[error(transparent)]
    Store(#[from] BlockStoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_gone_classification() {
        assert!(BlockStoreError::FileMissing { file_id: FileId(3) }.is_data_gone());
        assert!(BlockStoreError::RegionUnreadable {
            file_id: FileId(3),
            offset: 10,
            end: 20,
            file_len: 15,
        }
        .is_data_gone());
        assert!(!BlockStoreError::FileInUse { file_id: FileId(3) }.is_data_gone());
        assert!(!BlockStoreError::Io {
            message: "permission denied".into()
        }
        .is_data_gone());
    }

    #[test]
    fn test_display_mentions_file() {
        let err = BlockStoreError::FileMissing { file_id: FileId(12) };
        assert_eq!(err.to_string(), "block file blk00012 is missing");
    }
}
