//! # Ports Layer
//!
//! - `inbound.rs` - Driving port used by query adapters
//!
//! Outbound dependencies (`KeyValueStore`, `BlockStore`) come from the
//! `block-storage` crate.

pub mod inbound;

pub use inbound::TransactionLookupApi;
