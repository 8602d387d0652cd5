//! # Runtime Adapters
//!
//! - `metered_lookup` - Prometheus counting around the lookup port
//! - `storage` - Key-value backends for the index and node metadata

pub mod metered_lookup;
pub mod storage;

pub use metered_lookup::MeteredLookup;
pub use storage::{open_store, DynStore};
