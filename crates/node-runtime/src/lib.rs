//! # Node Runtime Library
//!
//! Wires block storage, pruning and the transaction index into one running
//! node. The `main.rs` binary is a thin shell over [`Node`].
//!
//! ## Structure
//!
//! - `container/` - Configuration and on-disk services in dependency order
//! - `adapters/` - Key-value backends and the metered lookup port
//! - `handlers/` - Block-connection and prune workers
//! - `devnet/` - Synthetic chain feed for local nodes
//! - `node` - Worker lifecycle, event submission, manual pruning

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod container;
pub mod devnet;
pub mod error;
pub mod handlers;
pub mod node;
pub mod shutdown;

pub use container::{ConfigError, NodeConfig, NodeServices, StorageBackend};
pub use devnet::{DevnetError, DevnetFeeder};
pub use error::NodeError;
pub use node::{Node, NodeLookup};
