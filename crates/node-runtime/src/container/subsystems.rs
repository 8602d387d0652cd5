//! # Node Services
//!
//! Opens every on-disk component in dependency order and holds them for the
//! node's lifetime.
//!
//! ## Initialization Order
//!
//! ```text
//! 1. Data directory lock          (one process per data dir)
//! 2. Block files                  (scan, truncate torn tails)
//! 3. Metadata store -> boundary   (last persisted retention boundary)
//! 4. Prune tracker                (validates the prune config)
//! 5. Index store -> TxIndex -> TxLookupService   (only with txindex enabled)
//! ```
//!
//! The index and the tracker share the block store and the boundary. The
//! index never sees pruning; the lookup service reconciles the two.

use std::path::Path;
use std::sync::Arc;

use block_storage::{
    BlockStore, DatabaseLock, FlatFileBlockStore, PruneTracker, RetentionBoundary,
};
use shared_types::BlockHeight;
use tracing::{info, instrument};
use tx_indexing::{TxIndex, TxLookupService};

use crate::adapters::{open_store, DynStore};
use crate::container::config::NodeConfig;
use crate::error::NodeError;

pub type NodeIndex = TxIndex<DynStore>;
pub type NodeLookupService = TxLookupService<DynStore>;

/// Everything the workers and query handlers share.
pub struct NodeServices {
    pub config: NodeConfig,
    pub blocks: Arc<FlatFileBlockStore>,
    pub boundary: Arc<RetentionBoundary>,
    pub tracker: Arc<PruneTracker>,
    /// Present only with `enable_txindex`.
    pub index: Option<Arc<NodeIndex>>,
    pub lookup: Option<Arc<NodeLookupService>>,
    // Declared last so it is released after every store is dropped.
    _lock: DatabaseLock,
}

impl NodeServices {
    #[instrument(name = "node_open", skip(config), fields(data_dir = %config.data_dir.display()))]
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;

        let lock = DatabaseLock::acquire(&config.data_dir)?;

        let blocks = Arc::new(FlatFileBlockStore::open(
            config.blocks_dir(),
            config.preferred_block_file_size,
        )?);

        let meta = open_store(config.storage_backend, &config.meta_dir())?;
        let boundary = Arc::new(RetentionBoundary::load(meta)?);

        let tracker = Arc::new(PruneTracker::new(
            config.prune_config(),
            blocks.clone(),
            boundary.clone(),
        )?);

        let (index, lookup) = if config.enable_txindex {
            let (index, lookup) = open_index(&config, &config.index_dir(), &blocks, &boundary)?;
            (Some(index), Some(lookup))
        } else {
            (None, None)
        };

        info!(
            txindex = config.enable_txindex,
            pruning = config.enable_pruning,
            retention_depth = config.retention_depth,
            boundary = boundary.current(),
            block_files = blocks.block_files()?.len(),
            "node services opened"
        );

        Ok(Self {
            config,
            blocks,
            boundary,
            tracker,
            index,
            lookup,
            _lock: lock,
        })
    }

    /// Height of the last known block: the index's best block, or the highest
    /// block in the files when the index is off or empty.
    pub fn chain_tip(&self) -> Result<Option<BlockHeight>, NodeError> {
        if let Some(index) = &self.index {
            if let Some(best) = index.best_block()? {
                return Ok(Some(best.height));
            }
        }
        Ok(self
            .blocks
            .block_files()?
            .iter()
            .map(|f| f.last_height)
            .max())
    }

    /// Sync the boundary and the index to disk.
    pub fn flush(&self) -> Result<(), NodeError> {
        self.boundary.flush()?;
        if let Some(index) = &self.index {
            index.flush()?;
        }
        Ok(())
    }
}

fn open_index(
    config: &NodeConfig,
    dir: &Path,
    blocks: &Arc<FlatFileBlockStore>,
    boundary: &Arc<RetentionBoundary>,
) -> Result<(Arc<NodeIndex>, Arc<NodeLookupService>), NodeError> {
    let index = Arc::new(TxIndex::new(open_store(config.storage_backend, dir)?));
    let stats = index.stats()?;
    info!(
        indexed_transactions = stats.indexed_transactions,
        best_height = ?stats.best_block.map(|b| b.height),
        "transaction index opened"
    );

    let lookup = Arc::new(TxLookupService::new(
        index.clone(),
        boundary.clone(),
        blocks.clone(),
        config.lookup_config(),
    ));
    Ok((index, lookup))
}
