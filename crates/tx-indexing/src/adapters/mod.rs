//! # Adapters Module
//!
//! - `api_handler`: JSON query handler for RPC front ends

pub mod api_handler;

pub use api_handler::{
    handle_api_query, ApiGatewayHandler, ApiQueryError, ProofTarget, TxIndexMetrics,
};
