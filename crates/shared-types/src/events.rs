//! # Chain Notifications
//!
//! Events emitted by the chain-state layer as the active chain changes.
//! The block-connection worker is the only consumer that writes the index.

use serde::{Deserialize, Serialize};

use crate::entities::{BlockHash, BlockHeight, TransactionLocation, TxId};

/// One transaction of a connected block, with where its bytes were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedTransaction {
    pub tx_id: TxId,
    pub location: TransactionLocation,
}

/// A block that was appended to the active chain.
///
/// `transactions` is in block order; the position of each element is the
/// transaction's ordinal inside the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedBlock {
    pub height: BlockHeight,
    pub block_hash: BlockHash,
    pub transactions: Vec<IndexedTransaction>,
}

impl ConnectedBlock {
    pub fn tx_ids(&self) -> impl Iterator<Item = &TxId> {
        self.transactions.iter().map(|tx| &tx.tx_id)
    }
}

/// Active-chain transitions, in the order they are applied.
///
/// A reorganization arrives as one or more `BlockDisconnected` events
/// (tip first) followed by `BlockConnected` events for the replacement
/// branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    BlockConnected(ConnectedBlock),
    BlockDisconnected {
        height: BlockHeight,
        block_hash: BlockHash,
    },
}

impl ChainEvent {
    pub fn height(&self) -> BlockHeight {
        match self {
            ChainEvent::BlockConnected(block) => block.height,
            ChainEvent::BlockDisconnected { height, .. } => *height,
        }
    }
}
