//! # Depth-Based Pruning
//!
//! Pure planning for the prune tracker.
//!
//! ## Algorithm
//!
//! 1. Prune height = `tip - retention_depth` (nothing to do while the chain
//!    is shorter than the depth)
//! 2. Every block file whose highest block is at or below the prune height
//!    is a candidate, processed in ascending height order
//! 3. After each deletion the boundary moves to the lowest height that may
//!    still have data: `prune_height + 1`, or the first height of the lowest
//!    file that is still on disk, whichever is smaller
//!
//! A file that fails to delete stays on disk and so pins the boundary at its
//! first height until a later cycle removes it.

use shared_types::{BlockHeight, FileId};

use super::block_file::BlockFileInfo;
use super::errors::{BlockStoreError, PruneError};

/// Blocks the node always keeps regardless of configuration.
pub const DEFAULT_MIN_BLOCKS_TO_KEEP: u64 = 288;

// =============================================================================
// PRUNING CONFIGURATION
// =============================================================================

/// Configuration for depth-based pruning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneConfig {
    /// Enable pruning
    pub enabled: bool,
    /// Blocks below the tip whose files must survive
    pub retention_depth: u64,
    /// Hard floor for `retention_depth`
    pub min_blocks_to_keep: u64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_depth: DEFAULT_MIN_BLOCKS_TO_KEEP,
            min_blocks_to_keep: DEFAULT_MIN_BLOCKS_TO_KEEP,
        }
    }
}

impl PruneConfig {
    /// Pruning enabled with the given depth and the default minimum.
    pub fn enabled(retention_depth: u64) -> Self {
        Self {
            enabled: true,
            retention_depth,
            ..Self::default()
        }
    }

    /// Override the hard minimum.
    pub fn with_min_blocks_to_keep(mut self, min_blocks_to_keep: u64) -> Self {
        self.min_blocks_to_keep = min_blocks_to_keep;
        self
    }

    pub fn validate(&self) -> Result<(), PruneError> {
        if self.min_blocks_to_keep == 0 {
            return Err(PruneError::InvalidMinimum);
        }
        if self.enabled && self.retention_depth < self.min_blocks_to_keep {
            return Err(PruneError::RetentionTooShallow {
                requested: self.retention_depth,
                minimum: self.min_blocks_to_keep,
            });
        }
        Ok(())
    }

    /// Prune height for an automatic cycle. `None` while `tip < retention_depth`.
    pub fn automatic_prune_height(&self, tip: BlockHeight) -> Option<BlockHeight> {
        tip.checked_sub(self.retention_depth)
    }

    /// Prune height for a manual request, clamped out of the minimum window.
    pub fn manual_prune_height(
        &self,
        requested: BlockHeight,
        tip: BlockHeight,
    ) -> Option<BlockHeight> {
        tip.checked_sub(self.min_blocks_to_keep)
            .map(|ceiling| requested.min(ceiling))
    }
}

// =============================================================================
// PLANNING
// =============================================================================

/// Files eligible for deletion at `prune_height`, lowest heights first.
pub fn files_to_prune(files: &[BlockFileInfo], prune_height: BlockHeight) -> Vec<BlockFileInfo> {
    let mut eligible: Vec<_> = files
        .iter()
        .filter(|f| f.entirely_at_or_below(prune_height))
        .copied()
        .collect();
    eligible.sort_by_key(|f| (f.first_height, f.file_id));
    eligible
}

/// Boundary implied by the files still on disk.
///
/// Never lower than `current`; the boundary only moves forward here.
pub fn boundary_after(
    current: BlockHeight,
    prune_height: BlockHeight,
    remaining: impl IntoIterator<Item = BlockFileInfo>,
) -> BlockHeight {
    let lowest_remaining = remaining
        .into_iter()
        .map(|f| f.first_height)
        .min()
        .unwrap_or(BlockHeight::MAX);
    let candidate = prune_height.saturating_add(1).min(lowest_remaining);
    current.max(candidate)
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// A block file that could not be deleted during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneFailure {
    pub file_id: FileId,
    pub error: BlockStoreError,
}

/// Summary of one prune cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PruneOutcome {
    pub files_deleted: Vec<FileId>,
    pub bytes_reclaimed: u64,
    pub boundary_before: BlockHeight,
    pub boundary_after: BlockHeight,
    pub failures: Vec<PruneFailure>,
}

impl PruneOutcome {
    /// Outcome of a cycle that found nothing to do.
    pub fn unchanged(boundary: BlockHeight) -> Self {
        Self {
            boundary_before: boundary,
            boundary_after: boundary,
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.files_deleted.is_empty() && self.failures.is_empty()
    }
}
