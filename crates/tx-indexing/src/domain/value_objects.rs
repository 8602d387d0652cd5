//! # Value Objects
//!
//! Configuration for the lookup service.

use serde::{Deserialize, Serialize};

/// Configuration for [`TxLookupService`](crate::TxLookupService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Maximum number of Merkle trees kept in memory (default: 1000).
    ///
    /// Trees are evicted least-recently-used first.
    pub max_cached_trees: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_cached_trees: 1000,
        }
    }
}
