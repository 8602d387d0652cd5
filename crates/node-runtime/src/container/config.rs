//! # Node Configuration
//!
//! Runtime parameters for storage, pruning and the transaction index.
//!
//! ## Environment Overrides
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `TXI_TXINDEX` | `enable_txindex` | `true` |
//! | `TXI_PRUNE` | `enable_pruning` | `false` |
//! | `TXI_RETENTION_DEPTH` | `retention_depth` | `288` |
//! | `TXI_PRUNE_MIN_BLOCKS_TO_KEEP` | `min_blocks_to_keep` | `288` |
//! | `TXI_PRUNE_INTERVAL_SECS` | `prune_interval` | `60` |
//! | `TXI_DATA_DIR` | `data_dir` | `./data` |
//! | `TXI_PREFERRED_BLOCK_FILE_SIZE` | `preferred_block_file_size` | 128 MiB |
//! | `TXI_MAX_CACHED_TREES` | `max_cached_trees` | `1000` |
//! | `TXI_EVENT_CHANNEL_CAPACITY` | `event_channel_capacity` | `1024` |
//! | `TXI_STORAGE_BACKEND` | `storage_backend` | `file` |
//!
//! `enable_txindex` and `enable_pruning` are independent; every combination
//! is accepted.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use block_storage::{PruneConfig, PruneError, DEFAULT_MIN_BLOCKS_TO_KEEP};
use thiserror::Error;
use tx_indexing::LookupConfig;

/// Key-value backend for the index and node metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Checksummed append logs under the data directory.
    File,
    /// RocksDB databases under the data directory.
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "rocksdb" => Ok(Self::RocksDb),
            other => Err(format!("unknown storage backend {:?}", other)),
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Maintain the transaction index.
    pub enable_txindex: bool,
    /// Delete old block files.
    pub enable_pruning: bool,
    /// Blocks below the tip whose files must survive pruning.
    pub retention_depth: u64,
    /// Hard floor for `retention_depth`.
    pub min_blocks_to_keep: u64,
    /// Period of the automatic prune cycle.
    pub prune_interval: Duration,
    /// Root of all on-disk state.
    pub data_dir: PathBuf,
    /// Block files roll over once they would exceed this many bytes.
    pub preferred_block_file_size: u64,
    pub max_cached_trees: usize,
    /// Capacity of the chain event channel.
    pub event_channel_capacity: usize,
    pub storage_backend: StorageBackend,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enable_txindex: true,
            enable_pruning: false,
            retention_depth: DEFAULT_MIN_BLOCKS_TO_KEEP,
            min_blocks_to_keep: DEFAULT_MIN_BLOCKS_TO_KEEP,
            prune_interval: Duration::from_secs(60),
            data_dir: PathBuf::from("./data"),
            preferred_block_file_size: 128 * 1024 * 1024,
            max_cached_trees: LookupConfig::default().max_cached_trees,
            event_channel_capacity: 1024,
            storage_backend: StorageBackend::File,
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `TXI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("TXI_TXINDEX") {
            config.enable_txindex = parse_bool("TXI_TXINDEX", &v)?;
        }
        if let Some(v) = lookup("TXI_PRUNE") {
            config.enable_pruning = parse_bool("TXI_PRUNE", &v)?;
        }
        if let Some(v) = lookup("TXI_RETENTION_DEPTH") {
            config.retention_depth = parse("TXI_RETENTION_DEPTH", &v)?;
        }
        if let Some(v) = lookup("TXI_PRUNE_MIN_BLOCKS_TO_KEEP") {
            config.min_blocks_to_keep = parse("TXI_PRUNE_MIN_BLOCKS_TO_KEEP", &v)?;
        }
        if let Some(v) = lookup("TXI_PRUNE_INTERVAL_SECS") {
            config.prune_interval = Duration::from_secs(parse("TXI_PRUNE_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("TXI_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TXI_PREFERRED_BLOCK_FILE_SIZE") {
            config.preferred_block_file_size = parse("TXI_PREFERRED_BLOCK_FILE_SIZE", &v)?;
        }
        if let Some(v) = lookup("TXI_MAX_CACHED_TREES") {
            config.max_cached_trees = parse("TXI_MAX_CACHED_TREES", &v)?;
        }
        if let Some(v) = lookup("TXI_EVENT_CHANNEL_CAPACITY") {
            config.event_channel_capacity = parse("TXI_EVENT_CHANNEL_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("TXI_STORAGE_BACKEND") {
            config.storage_backend = parse("TXI_STORAGE_BACKEND", &v)?;
        }

        Ok(config)
    }

    /// Reject configurations the node cannot start with.
    ///
    /// Never rejects `enable_txindex` together with `enable_pruning`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prune_config().validate()?;

        if self.preferred_block_file_size == 0 {
            return Err(ConfigError::invalid(
                "TXI_PREFERRED_BLOCK_FILE_SIZE",
                "0",
                "must be positive",
            ));
        }
        if self.prune_interval.is_zero() {
            return Err(ConfigError::invalid("TXI_PRUNE_INTERVAL_SECS", "0", "must be positive"));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "TXI_EVENT_CHANNEL_CAPACITY",
                "0",
                "must be positive",
            ));
        }
        if self.storage_backend == StorageBackend::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::invalid(
                "TXI_STORAGE_BACKEND",
                "rocksdb",
                "binary built without the rocksdb feature",
            ));
        }
        Ok(())
    }

    pub fn prune_config(&self) -> PruneConfig {
        PruneConfig {
            enabled: self.enable_pruning,
            retention_depth: self.retention_depth,
            min_blocks_to_keep: self.min_blocks_to_keep,
        }
    }

    pub fn lookup_config(&self) -> LookupConfig {
        LookupConfig {
            max_cached_trees: self.max_cached_trees,
        }
    }

    pub fn blocks_dir(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("txindex")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.data_dir.join("meta")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid pruning configuration: {0}")]
    Prune(#[from] PruneError),
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(var, value, e))
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(var, value, "expected a boolean")),
    }
}
