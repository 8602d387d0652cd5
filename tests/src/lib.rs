//! # Node Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── lookup_flows.rs   # lookups across pruning and reorgs on a running node
//!     └── restart.rs        # what survives a shutdown and reopen
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p node-tests
//! cargo test -p node-tests integration::restart
//!
//! # Benchmarks
//! cargo bench -p node-tests
//! ```

pub mod integration;
