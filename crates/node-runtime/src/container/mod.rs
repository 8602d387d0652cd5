//! # Node Container
//!
//! Configuration and the opened services the workers share.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NodeConfig, StorageBackend};
pub use subsystems::{NodeIndex, NodeLookupService, NodeServices};
