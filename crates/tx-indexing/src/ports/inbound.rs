//! # Inbound Ports (Driving Ports)
//!
//! Transaction queries exposed to RPC-style adapters.

use shared_types::TxId;

use crate::domain::{LookupError, LookupStats, MerkleProof, TxIndexEntry};

/// Read-only transaction queries.
///
/// Every method distinguishes `NotFound` (never indexed) from `Pruned`
/// (indexed, data reclaimed).
pub trait TransactionLookupApi: Send + Sync {
    /// Serialized bytes of a transaction.
    fn get_transaction(&self, tx_id: &TxId) -> Result<Vec<u8>, LookupError>;

    /// Block and file location of a retained transaction.
    fn get_entry(&self, tx_id: &TxId) -> Result<TxIndexEntry, LookupError>;

    /// Inclusion proof for a retained transaction.
    fn get_merkle_proof(&self, tx_id: &TxId) -> Result<MerkleProof, LookupError>;

    fn stats(&self) -> Result<LookupStats, LookupError>;
}

impl<T: TransactionLookupApi + ?Sized> TransactionLookupApi for std::sync::Arc<T> {
    fn get_transaction(&self, tx_id: &TxId) -> Result<Vec<u8>, LookupError> {
        (**self).get_transaction(tx_id)
    }

    fn get_entry(&self, tx_id: &TxId) -> Result<TxIndexEntry, LookupError> {
        (**self).get_entry(tx_id)
    }

    fn get_merkle_proof(&self, tx_id: &TxId) -> Result<MerkleProof, LookupError> {
        (**self).get_merkle_proof(tx_id)
    }

    fn stats(&self) -> Result<LookupStats, LookupError> {
        (**self).stats()
    }
}
