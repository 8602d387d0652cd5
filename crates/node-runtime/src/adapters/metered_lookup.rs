//! # Metered Lookup
//!
//! Wraps a [`TransactionLookupApi`] and counts every result in
//! `txi_lookup_results_total{outcome}`.

use node_telemetry::LOOKUP_RESULTS;
use shared_types::TxId;
use tx_indexing::{LookupError, LookupStats, MerkleProof, TransactionLookupApi, TxIndexEntry};

pub struct MeteredLookup<S> {
    inner: S,
}

impl<S: TransactionLookupApi> MeteredLookup<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn record<T>(result: Result<T, LookupError>) -> Result<T, LookupError> {
    let outcome = match &result {
        Ok(_) => "found",
        Err(e) => e.outcome(),
    };
    LOOKUP_RESULTS.with_label_values(&[outcome]).inc();
    result
}

impl<S: TransactionLookupApi> TransactionLookupApi for MeteredLookup<S> {
    fn get_transaction(&self, tx_id: &TxId) -> Result<Vec<u8>, LookupError> {
        record(self.inner.get_transaction(tx_id))
    }

    fn get_entry(&self, tx_id: &TxId) -> Result<TxIndexEntry, LookupError> {
        record(self.inner.get_entry(tx_id))
    }

    fn get_merkle_proof(&self, tx_id: &TxId) -> Result<MerkleProof, LookupError> {
        record(self.inner.get_merkle_proof(tx_id))
    }

    fn stats(&self) -> Result<LookupStats, LookupError> {
        self.inner.stats()
    }
}
