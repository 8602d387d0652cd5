//! Errors surfaced by the node runtime.

use block_storage::{BlockStoreError, KVStoreError, LockError, PruneError};
use thiserror::Error;
use tx_indexing::IndexingError;

use crate::container::ConfigError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("data directory: {0}")]
    Lock(#[from] LockError),

    #[error("block store: {0}")]
    BlockStore(#[from] BlockStoreError),

    #[error("key-value store: {0}")]
    KVStore(#[from] KVStoreError),

    #[error("pruning: {0}")]
    Prune(#[from] PruneError),

    #[error("transaction index: {0}")]
    Indexing(#[from] IndexingError),

    #[error("{worker} worker is not running")]
    WorkerStopped { worker: &'static str },

    #[error("{worker} worker panicked")]
    WorkerPanicked { worker: &'static str },
}
