//! # Adapters Module
//!
//! Implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `flat_file`: Numbered block files in a directory
//! - `kv_file`: Append-log key-value store
//! - `memory`: In-memory block files and key-value store with failure hooks
//! - `lock`: Data directory process lock (singleton guard)

pub mod flat_file;
pub mod kv_file;
#[cfg(feature = "locking")]
pub mod lock;
pub mod memory;

pub use flat_file::FlatFileBlockStore;
pub use kv_file::FileBackedKVStore;
#[cfg(feature = "locking")]
pub use lock::{DatabaseLock, LockError};
pub use memory::{InMemoryBlockStore, InMemoryKVStore};
