//! # Node Workers
//!
//! Long-running tasks spawned by [`Node::start`](crate::node::Node::start).
//!
//! ## Flow
//!
//! ```text
//! chain state ──ChainEvent──→ ChainEventHandler ──record/rewrite/remove──→ TxIndex
//!                                    │ tip
//!                                    ↓
//!              timer / request ─→ PruneHandler ──prune_cycle──→ PruneTracker
//! ```
//!
//! Both hold the same chain lock while they work.

pub mod chain_events;
pub mod pruning;

pub use chain_events::ChainEventHandler;
pub use pruning::{PruneHandler, PruneRequest};
