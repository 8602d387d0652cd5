//! # Index Key Layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `t:` + txid | bincode([`TxIndexEntry`](super::TxIndexEntry)) |
//! | `h:` + height (8 BE) + position (4 BE) | txid |
//! | `b:` + height (8 BE) | block hash |
//! | `m:best` | bincode([`BestBlock`](super::BestBlock)) |
//! | `m:count` | indexed transaction count (u64 LE) |
//!
//! Heights and positions are big-endian so a prefix scan over `h:` + height
//! returns a block's transactions in position order.

use shared_types::{BlockHeight, TxId};

pub const TX_PREFIX: &[u8] = b"t:";
pub const MEMBERSHIP_PREFIX: &[u8] = b"h:";
pub const BLOCK_HASH_PREFIX: &[u8] = b"b:";
pub const BEST_KEY: &[u8] = b"m:best";
pub const COUNT_KEY: &[u8] = b"m:count";

pub fn tx_key(tx_id: &TxId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TX_PREFIX.len() + 32);
    key.extend_from_slice(TX_PREFIX);
    key.extend_from_slice(tx_id);
    key
}

/// Prefix covering every membership row of one block.
pub fn membership_prefix(height: BlockHeight) -> Vec<u8> {
    let mut key = Vec::with_capacity(MEMBERSHIP_PREFIX.len() + 12);
    key.extend_from_slice(MEMBERSHIP_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

pub fn membership_key(height: BlockHeight, position: u32) -> Vec<u8> {
    let mut key = membership_prefix(height);
    key.extend_from_slice(&position.to_be_bytes());
    key
}

pub fn block_hash_key(height: BlockHeight) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOCK_HASH_PREFIX.len() + 8);
    key.extend_from_slice(BLOCK_HASH_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}
