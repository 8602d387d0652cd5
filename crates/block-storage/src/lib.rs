//! # Block Storage
//!
//! Append-only block files, the retention boundary, and the pruning that
//! retires old files.
//!
//! ## Responsibilities
//!
//! | Component | Role |
//! |-----------|------|
//! | [`BlockStore`] | Read bytes by location, delete whole files, report file height ranges |
//! | [`RetentionBoundary`] | Durable "lowest retained height", monotone, published after persistence |
//! | [`PruneTracker`] | Picks files entirely below `tip - retention_depth`, deletes them, advances the boundary |
//!
//! ## Ordering Contract
//!
//! Each file is deleted first and the boundary advance for it is persisted
//! afterwards. A crash in between leaves the boundary behind the data, which
//! readers absorb by treating a failed read as "pruned".
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Pure logic (file ranges, record encoding, prune planning, errors)
//! - `ports/` - Outbound traits (`BlockStore`, `KeyValueStore`)
//! - `service/` - `RetentionBoundary` and `PruneTracker`
//! - `adapters/` - Flat-file and in-memory implementations, data directory lock
//!
//! ## Usage
//!
//! ```ignore
//! use block_storage::{FlatFileBlockStore, PruneConfig, PruneTracker, RetentionBoundary};
//!
//! let blocks = Arc::new(FlatFileBlockStore::open(dir.join("blocks"), 128 << 20)?);
//! let boundary = Arc::new(RetentionBoundary::load(Box::new(meta_store))?);
//! let tracker = PruneTracker::new(PruneConfig::enabled(288), blocks, boundary)?;
//!
//! let outcome = tracker.prune_cycle(tip_height)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{FileBackedKVStore, FlatFileBlockStore, InMemoryBlockStore, InMemoryKVStore};
#[cfg(feature = "locking")]
pub use adapters::{DatabaseLock, LockError};
pub use domain::block_file::BlockFileInfo;
pub use domain::errors::{BlockStoreError, KVStoreError, PruneError};
pub use domain::pruning::{PruneConfig, PruneFailure, PruneOutcome, DEFAULT_MIN_BLOCKS_TO_KEEP};
pub use ports::outbound::{BatchOperation, BlockStore, BlockWriter, KeyValueStore, ScanResult};
pub use service::{PruneTracker, RetentionBoundary};
