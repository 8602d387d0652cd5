//! # Domain Layer
//!
//! Pure logic for block files and pruning. No I/O lives here; adapters and
//! services drive it.
//!
//! ## Modules
//!
//! - `block_file` - File height ranges and the on-disk block record layout
//! - `pruning` - Prune configuration, planning and outcomes
//! - `errors` - Domain error types

pub mod block_file;
pub mod errors;
pub mod pruning;
