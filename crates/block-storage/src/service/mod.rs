//! # Block Storage Services
//!
//! - `retention` - Durable retention boundary shared by pruner and readers
//! - `pruning` - Prune tracker driving file deletion

pub mod pruning;
pub mod retention;

pub use pruning::PruneTracker;
pub use retention::{RetentionBoundary, BOUNDARY_KEY};
