//! # Devnet Feeder
//!
//! Stands in for the chain-state layer on a local node: appends synthetic
//! blocks to the block files and produces the [`ChainEvent`]s that announce
//! them, including reorganizations.
//!
//! Transaction bytes are derived from `(branch, height, position)`, so a
//! transaction on the active chain can be regenerated for comparison without
//! keeping block bodies in memory.

use shared_types::{
    tx_id_of, BlockHash, BlockHeight, ChainEvent, ConnectedBlock, IndexedTransaction, TxId,
};
use thiserror::Error;

use block_storage::{BlockStoreError, BlockWriter};

#[derive(Debug, Error)]
pub enum DevnetError {
    #[error(transparent)]
    BlockStore(#[from] BlockStoreError),

    #[error("cannot reorg {depth} blocks, only {known} known")]
    ReorgTooDeep { depth: u64, known: u64 },
}

#[derive(Debug, Clone, Copy)]
struct FedBlock {
    hash: BlockHash,
    branch: u32,
}

/// Synthetic chain producer.
#[derive(Debug)]
pub struct DevnetFeeder {
    txs_per_block: u32,
    /// Height of `chain[0]`.
    base_height: BlockHeight,
    /// Parent of `chain[0]`.
    base_parent: BlockHash,
    chain: Vec<FedBlock>,
    branch: u32,
}

impl DevnetFeeder {
    /// Feeder that starts at genesis.
    pub fn new(txs_per_block: u32) -> Self {
        Self::resume(txs_per_block, 0, [0; 32])
    }

    /// Feeder that continues a chain whose next block is `next_height`.
    ///
    /// Blocks below `next_height` were not produced by this feeder and
    /// cannot be reorganized or regenerated.
    pub fn resume(txs_per_block: u32, next_height: BlockHeight, parent: BlockHash) -> Self {
        Self {
            txs_per_block: txs_per_block.max(1),
            base_height: next_height,
            base_parent: parent,
            chain: Vec::new(),
            branch: 0,
        }
    }

    /// Height and hash of the last block produced.
    pub fn tip(&self) -> Option<(BlockHeight, BlockHash)> {
        self.chain
            .last()
            .map(|b| (self.base_height + self.chain.len() as u64 - 1, b.hash))
    }

    pub fn next_height(&self) -> BlockHeight {
        self.base_height + self.chain.len() as u64
    }

    /// Append the next block and announce it.
    pub fn next_block<W>(&mut self, writer: &W) -> Result<ChainEvent, DevnetError>
    where
        W: BlockWriter + ?Sized,
    {
        let height = self.next_height();
        let parent = self.tip().map_or(self.base_parent, |(_, hash)| hash);

        let bodies: Vec<Vec<u8>> = (0..self.txs_per_block)
            .map(|position| transaction_bytes(self.branch, height, position))
            .collect();
        let locations = writer.append_block(height, &bodies)?;

        let transactions: Vec<IndexedTransaction> = bodies
            .iter()
            .zip(locations)
            .map(|(body, location)| IndexedTransaction {
                tx_id: tx_id_of(body),
                location,
            })
            .collect();
        let block_hash = header_hash(&parent, height, &transactions);

        self.chain.push(FedBlock {
            hash: block_hash,
            branch: self.branch,
        });
        Ok(ChainEvent::BlockConnected(ConnectedBlock {
            height,
            block_hash,
            transactions,
        }))
    }

    /// Replace the top `depth` blocks with a new branch of the same length.
    ///
    /// Returns the disconnects (tip first) followed by the connects.
    pub fn reorg<W>(&mut self, writer: &W, depth: u64) -> Result<Vec<ChainEvent>, DevnetError>
    where
        W: BlockWriter + ?Sized,
    {
        let known = self.chain.len() as u64;
        if depth > known {
            return Err(DevnetError::ReorgTooDeep { depth, known });
        }

        let mut events = Vec::with_capacity(depth as usize * 2);
        for _ in 0..depth {
            if let Some((height, block_hash)) = self.tip() {
                events.push(ChainEvent::BlockDisconnected { height, block_hash });
                self.chain.pop();
            }
        }

        self.branch += 1;
        for _ in 0..depth {
            events.push(self.next_block(writer)?);
        }
        Ok(events)
    }

    /// Identifier and bytes of the transaction at `position` in the active
    /// block at `height`, if this feeder produced it.
    pub fn transaction(&self, height: BlockHeight, position: u32) -> Option<(TxId, Vec<u8>)> {
        if position >= self.txs_per_block {
            return None;
        }
        let index = usize::try_from(height.checked_sub(self.base_height)?).ok()?;
        let block = self.chain.get(index)?;
        let bytes = transaction_bytes(block.branch, height, position);
        Some((tx_id_of(&bytes), bytes))
    }
}

fn transaction_bytes(branch: u32, height: BlockHeight, position: u32) -> Vec<u8> {
    format!("devnet-tx/{branch}/{height}/{position}").into_bytes()
}

fn header_hash(parent: &BlockHash, height: BlockHeight, transactions: &[IndexedTransaction]) -> BlockHash {
    let mut header = Vec::with_capacity(40 + transactions.len() * 32);
    header.extend_from_slice(parent);
    header.extend_from_slice(&height.to_le_bytes());
    for tx in transactions {
        header.extend_from_slice(&tx.tx_id);
    }
    tx_id_of(&header)
}
