//! # Storage Adapters
//!
//! Key-value backends for the transaction index and node metadata.
//!
//! ## Usage
//!
//! The append-log store from `block-storage` is always available. Enable the
//! `rocksdb` feature for RocksDB:
//!
//! ```toml
//! node-runtime = { path = "...", features = ["rocksdb"] }
//! ```

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

use std::path::Path;

use block_storage::{FileBackedKVStore, KeyValueStore};
use tracing::info;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

use crate::container::StorageBackend;
use crate::error::NodeError;

/// Boxed store shared by the index and the retention boundary.
pub type DynStore = Box<dyn KeyValueStore>;

const LOG_FILE: &str = "store.log";

/// Open the store kept in directory `dir`.
///
/// Append logs are compacted on open so they do not grow without bound
/// across restarts.
pub fn open_store(backend: StorageBackend, dir: &Path) -> Result<DynStore, NodeError> {
    match backend {
        StorageBackend::File => {
            let mut store = FileBackedKVStore::open(dir.join(LOG_FILE))?;
            let before = store.log_len();
            store.compact()?;
            info!(
                path = %store.path().display(),
                before,
                after = store.log_len(),
                "compacted key-value log"
            );
            Ok(Box::new(store))
        }
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => Ok(Box::new(RocksDbStore::open(RocksDbConfig::at(dir))?)),
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => Err(crate::container::ConfigError::InvalidValue {
            var: "TXI_STORAGE_BACKEND",
            value: "rocksdb".to_string(),
            reason: "binary built without the rocksdb feature".to_string(),
        }
        .into()),
    }
}
