//! # Shared Types Crate
//!
//! Types that cross crate boundaries between the chain-state side (which
//! appends blocks and emits notifications), the block storage layer, and the
//! transaction index.
//!
//! ## Design Principles
//!
//! - **Locations are values**: a [`TransactionLocation`] is `Copy` and never
//!   changes once written. The index owns it; storage only receives copies.
//! - **Notifications carry everything**: a [`ChainEvent`] holds the height,
//!   block hash and per-transaction locations so the indexer never needs to
//!   read block bytes back.

pub mod entities;
pub mod errors;
pub mod events;

pub use entities::*;
pub use errors::*;
pub use events::*;
