//! # Ports Layer
//!
//! Defines the port traits for block storage.
//!
//! ## Hexagonal Architecture
//!
//! - `outbound.rs` - Driven ports (block files and the metadata store)
//!
//! There is no inbound port: the prune tracker and retention boundary are
//! concrete services used directly by the node runtime.

pub mod outbound;
