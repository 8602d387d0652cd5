//! # Prune Tracker
//!
//! Deletes block files that have fallen below the retention window and
//! advances the retention boundary behind them.
//!
//! Callers must not run a prune cycle concurrently with a reorganization
//! touching the same heights; the node runtime serializes both through its
//! chain lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::BlockHeight;
use tracing::{debug, info, warn};

use super::retention::RetentionBoundary;
use crate::domain::errors::PruneError;
use crate::domain::pruning::{
    boundary_after, files_to_prune, PruneConfig, PruneFailure, PruneOutcome,
};
use crate::ports::outbound::BlockStore;

pub struct PruneTracker {
    config: RwLock<PruneConfig>,
    blocks: Arc<dyn BlockStore>,
    boundary: Arc<RetentionBoundary>,
}

impl PruneTracker {
    /// Create a tracker, rejecting an invalid configuration.
    pub fn new(
        config: PruneConfig,
        blocks: Arc<dyn BlockStore>,
        boundary: Arc<RetentionBoundary>,
    ) -> Result<Self, PruneError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            blocks,
            boundary,
        })
    }

    /// Replace the configuration. The old one stays if the new one is invalid.
    pub fn configure(&self, config: PruneConfig) -> Result<(), PruneError> {
        config.validate()?;
        *self.config.write() = config;
        info!(
            enabled = config.enabled,
            retention_depth = config.retention_depth,
            min_blocks_to_keep = config.min_blocks_to_keep,
            "prune configuration updated"
        );
        Ok(())
    }

    pub fn config(&self) -> PruneConfig {
        *self.config.read()
    }

    pub fn boundary(&self) -> &Arc<RetentionBoundary> {
        &self.boundary
    }

    /// Automatic cycle for the current tip.
    ///
    /// Does nothing when pruning is disabled or the chain is shorter than the
    /// retention depth.
    pub fn prune_cycle(&self, tip: BlockHeight) -> Result<PruneOutcome, PruneError> {
        let config = self.config();
        if !config.enabled {
            return Ok(PruneOutcome::unchanged(self.boundary.current()));
        }
        match config.automatic_prune_height(tip) {
            Some(prune_height) => self.prune_through(prune_height),
            None => {
                debug!(tip, retention_depth = config.retention_depth, "chain shorter than retention depth");
                Ok(PruneOutcome::unchanged(self.boundary.current()))
            }
        }
    }

    /// Manual prune up to `height`, never inside the minimum window below `tip`.
    pub fn prune_to_height(
        &self,
        height: BlockHeight,
        tip: BlockHeight,
    ) -> Result<PruneOutcome, PruneError> {
        let config = self.config();
        if !config.enabled {
            return Err(PruneError::PruningDisabled);
        }
        match config.manual_prune_height(height, tip) {
            Some(prune_height) => self.prune_through(prune_height),
            None => Ok(PruneOutcome::unchanged(self.boundary.current())),
        }
    }

    /// Delete every file entirely at or below `prune_height`.
    ///
    /// Each deletion is followed by a persisted boundary advance, so stopping
    /// between files leaves a consistent state. A failed deletion is
    /// reported and keeps its file, which holds the boundary below it.
    fn prune_through(&self, prune_height: BlockHeight) -> Result<PruneOutcome, PruneError> {
        let files = self.blocks.block_files()?;
        let plan = files_to_prune(&files, prune_height);
        let mut remaining: BTreeMap<_, _> = files.into_iter().map(|f| (f.file_id, f)).collect();

        let mut outcome = PruneOutcome::unchanged(self.boundary.current());

        for file in plan {
            match self.blocks.delete_file(file.file_id) {
                Ok(bytes) => {
                    remaining.remove(&file.file_id);
                    outcome.files_deleted.push(file.file_id);
                    outcome.bytes_reclaimed += bytes;
                    debug!(
                        file = %file.file_id,
                        first_height = file.first_height,
                        last_height = file.last_height,
                        bytes,
                        "pruned block file"
                    );
                }
                Err(error) => {
                    warn!(
                        file = %file.file_id,
                        error = %error,
                        "failed to delete block file, will retry next cycle"
                    );
                    outcome.failures.push(PruneFailure {
                        file_id: file.file_id,
                        error,
                    });
                    continue;
                }
            }

            let target = boundary_after(
                self.boundary.current(),
                prune_height,
                remaining.values().copied(),
            );
            self.boundary.advance_to(target)?;
        }

        // Nothing was deleted but earlier cycles may have left the boundary
        // behind files that are already gone.
        let target = boundary_after(
            self.boundary.current(),
            prune_height,
            remaining.values().copied(),
        );
        self.boundary.advance_to(target)?;

        outcome.boundary_after = self.boundary.current();
        if !outcome.is_noop() || outcome.boundary_after != outcome.boundary_before {
            info!(
                prune_height,
                files_deleted = outcome.files_deleted.len(),
                bytes_reclaimed = outcome.bytes_reclaimed,
                failures = outcome.failures.len(),
                boundary_before = outcome.boundary_before,
                boundary_after = outcome.boundary_after,
                "prune cycle completed"
            );
        }
        Ok(outcome)
    }
}
