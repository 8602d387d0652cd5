//! # JSON Query Handler
//!
//! Maps JSON-RPC style method calls onto [`TransactionLookupApi`].
//!
//! ```text
//! RPC front end -> handle_api_query -> ApiGatewayHandler -> TxLookupService
//! ```
//!
//! ## Error Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | -5 | No such transaction (never indexed) |
//! | -1 | Transaction data pruned |
//! | -32602 | Invalid params |
//! | -32601 | Method not found |
//! | -32603 | Storage failure |

use serde::{Deserialize, Serialize};
use shared_types::{parse_hash, FileId, Hash};

use crate::domain::{LookupError, MerkleProof, SiblingPosition};
use crate::ports::TransactionLookupApi;

pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
pub const RPC_MISC_ERROR: i32 = -1;
pub const RPC_INVALID_PARAMS: i32 = -32602;
pub const RPC_METHOD_NOT_FOUND: i32 = -32601;
pub const RPC_INTERNAL_ERROR: i32 = -32603;

/// Error from API query handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiQueryError {
    pub code: i32,
    pub message: String,
}

impl ApiQueryError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: RPC_METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
        }
    }

    pub fn invalid_params(msg: &str) -> Self {
        Self {
            code: RPC_INVALID_PARAMS,
            message: msg.to_string(),
        }
    }
}

impl From<LookupError> for ApiQueryError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound { .. } => Self {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: "No such blockchain transaction".to_string(),
            },
            LookupError::Pruned { block_height, .. } => Self {
                code: RPC_MISC_ERROR,
                message: format!(
                    "Transaction data pruned (block {} is below the retention boundary)",
                    block_height
                ),
            },
            LookupError::Storage { message } => Self {
                code: RPC_INTERNAL_ERROR,
                message,
            },
        }
    }
}

impl std::fmt::Display for ApiQueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiQueryError {}

/// Metrics snapshot returned by `get_metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxIndexMetrics {
    pub indexed_transactions: u64,
    pub best_height: Option<u64>,
    /// Best block hash (hex)
    pub best_block_hash: Option<String>,
    pub retention_boundary: u64,
    pub cached_trees: usize,
    pub max_cached_trees: usize,
    pub cache_utilization_percent: f64,
    pub lookups_found: u64,
    pub lookups_not_found: u64,
    pub lookups_pruned: u64,
    pub proofs_generated: u64,
}

/// Response for `gettxlocation`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLocationResponse {
    pub txid: String,
    pub block_height: u64,
    pub block_hash: String,
    pub position: u32,
    pub file: String,
    pub offset: u64,
    pub length: u32,
}

/// Response for `getmerkleproof`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProofResponse {
    pub txid: String,
    pub block_height: u64,
    pub block_hash: String,
    pub tx_index: usize,
    pub merkle_root: String,
    /// Sibling hashes from leaf to root, each tagged `left` or `right`
    pub path: Vec<ProofStep>,
}

/// Response for `getmerkleproof2`, in TSC layout.
///
/// `nodes` runs leaf to root. A padding sibling is the all-zero hash, never
/// the `*` duplicate marker, since the tree pads rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TscMerkleProofResponse {
    pub index: usize,
    /// Raw transaction hex when the full transaction was requested, else txid
    pub tx_or_id: String,
    pub target: String,
    pub target_type: String,
    pub proof_type: String,
    pub composite: bool,
    pub nodes: Vec<String>,
}

/// What the `target` of a TSC proof names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofTarget {
    BlockHash,
    MerkleRoot,
}

impl ProofTarget {
    fn parse(name: &str) -> Result<Self, ApiQueryError> {
        match name {
            "hash" => Ok(Self::BlockHash),
            "merkleroot" => Ok(Self::MerkleRoot),
            other => Err(ApiQueryError::invalid_params(&format!(
                "Unsupported targetType: {}",
                other
            ))),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::BlockHash => "hash",
            Self::MerkleRoot => "merkleroot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: String,
    pub position: String,
}

impl From<MerkleProof> for MerkleProofResponse {
    fn from(proof: MerkleProof) -> Self {
        Self {
            txid: hex::encode(proof.leaf_hash),
            block_height: proof.block_height,
            block_hash: hex::encode(proof.block_hash),
            tx_index: proof.tx_index,
            merkle_root: hex::encode(proof.root),
            path: proof
                .path
                .into_iter()
                .map(|node| ProofStep {
                    hash: hex::encode(node.hash),
                    position: match node.position {
                        SiblingPosition::Left => "left".to_string(),
                        SiblingPosition::Right => "right".to_string(),
                    },
                })
                .collect(),
        }
    }
}

/// Query handler over any [`TransactionLookupApi`].
pub struct ApiGatewayHandler<S> {
    service: S,
}

impl<S: TransactionLookupApi> ApiGatewayHandler<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Handle ping request (health check).
    pub fn handle_ping(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "subsystem": "tx-indexing"
        })
    }

    pub fn handle_get_metrics(&self) -> Result<serde_json::Value, ApiQueryError> {
        let stats = self.service.stats()?;

        let cache_utilization = if stats.max_cached_trees > 0 {
            (stats.cached_trees as f64 / stats.max_cached_trees as f64) * 100.0
        } else {
            0.0
        };

        let metrics = TxIndexMetrics {
            indexed_transactions: stats.index.indexed_transactions,
            best_height: stats.index.best_block.map(|b| b.height),
            best_block_hash: stats.index.best_block.map(|b| hex::encode(b.block_hash)),
            retention_boundary: stats.retention_boundary,
            cached_trees: stats.cached_trees,
            max_cached_trees: stats.max_cached_trees,
            cache_utilization_percent: cache_utilization,
            lookups_found: stats.found,
            lookups_not_found: stats.not_found,
            lookups_pruned: stats.pruned,
            proofs_generated: stats.proofs_generated,
        };
        to_value(metrics)
    }

    /// `getrawtransaction`: hex-encoded bytes.
    pub fn handle_get_raw_transaction(&self, tx_id: Hash) -> Result<serde_json::Value, ApiQueryError> {
        let bytes = self.service.get_transaction(&tx_id)?;
        Ok(serde_json::json!({
            "txid": hex::encode(tx_id),
            "hex": hex::encode(bytes),
        }))
    }

    /// `gettxlocation`: where a retained transaction lives.
    pub fn handle_get_location(&self, tx_id: Hash) -> Result<serde_json::Value, ApiQueryError> {
        let entry = self.service.get_entry(&tx_id)?;
        to_value(TransactionLocationResponse {
            txid: hex::encode(entry.tx_id),
            block_height: entry.block_height,
            block_hash: hex::encode(entry.block_hash),
            position: entry.position,
            file: file_name(entry.location.file_id),
            offset: entry.location.offset,
            length: entry.location.length,
        })
    }

    /// `getmerkleproof`: inclusion proof for a retained transaction.
    pub fn handle_get_merkle_proof(&self, tx_id: Hash) -> Result<serde_json::Value, ApiQueryError> {
        let proof = self.service.get_merkle_proof(&tx_id)?;
        to_value(MerkleProofResponse::from(proof))
    }

    /// `getmerkleproof2`: TSC proof, optionally pinned to `block_hash`.
    pub fn handle_get_merkle_proof_tsc(
        &self,
        block_hash: Option<Hash>,
        tx_id: Hash,
        include_full_tx: bool,
        target: ProofTarget,
    ) -> Result<serde_json::Value, ApiQueryError> {
        let proof = self.service.get_merkle_proof(&tx_id)?;
        if block_hash.is_some_and(|hash| hash != proof.block_hash) {
            return Err(ApiQueryError {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: "Transaction not found in provided block".to_string(),
            });
        }

        let tx_or_id = if include_full_tx {
            hex::encode(self.service.get_transaction(&tx_id)?)
        } else {
            hex::encode(tx_id)
        };
        let target_hash = match target {
            ProofTarget::BlockHash => proof.block_hash,
            ProofTarget::MerkleRoot => proof.root,
        };

        to_value(TscMerkleProofResponse {
            index: proof.tx_index,
            tx_or_id,
            target: hex::encode(target_hash),
            target_type: target.name().to_string(),
            proof_type: "branch".to_string(),
            composite: false,
            nodes: proof.path.iter().map(|node| hex::encode(node.hash)).collect(),
        })
    }
}

/// Handle a JSON query.
///
/// ## Supported Methods
///
/// - `ping`: Health check
/// - `get_metrics`: Index and lookup counters
/// - `getrawtransaction`: Transaction bytes by `txid`
/// - `gettxlocation`: Block and file location by `txid`
/// - `getmerkleproof`: Inclusion proof by `txid`
/// - `getmerkleproof2`: TSC inclusion proof by `blockhash` (`""` for any
///   block), `txid`, `includeFullTx` and `targetType` (`hash` or `merkleroot`)
///
/// `txid` may be passed as `{"txid": "<hex>"}` or positionally as `["<hex>"]`;
/// `getmerkleproof2` takes it in the second positional slot.
pub fn handle_api_query<S: TransactionLookupApi>(
    handler: &ApiGatewayHandler<S>,
    method: &str,
    params: &serde_json::Value,
) -> Result<serde_json::Value, ApiQueryError> {
    match method {
        "ping" => Ok(handler.handle_ping()),
        "get_metrics" => handler.handle_get_metrics(),
        "getrawtransaction" => handler.handle_get_raw_transaction(parse_hash_param(params, "txid")?),
        "gettxlocation" => handler.handle_get_location(parse_hash_param(params, "txid")?),
        "getmerkleproof" => handler.handle_get_merkle_proof(parse_hash_param(params, "txid")?),
        "getmerkleproof2" => {
            let block_hash = match param(params, "blockhash", 0).and_then(|v| v.as_str()) {
                None | Some("") => None,
                Some(hex_str) => Some(parse_hash(hex_str).map_err(|e| {
                    ApiQueryError::invalid_params(&format!("Invalid blockhash: {}", e))
                })?),
            };
            let tx_id = parse_hash_at(params, "txid", 1)?;
            let include_full_tx = param(params, "includeFullTx", 2)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let target = match param(params, "targetType", 3).and_then(|v| v.as_str()) {
                Some(name) => ProofTarget::parse(name)?,
                None => ProofTarget::BlockHash,
            };
            handler.handle_get_merkle_proof_tsc(block_hash, tx_id, include_full_tx, target)
        }
        _ => Err(ApiQueryError::method_not_found(method)),
    }
}

/// Parse a hash parameter by name or from the first positional slot.
fn parse_hash_param(params: &serde_json::Value, name: &str) -> Result<Hash, ApiQueryError> {
    parse_hash_at(params, name, 0)
}

fn param<'a>(params: &'a serde_json::Value, name: &str, slot: usize) -> Option<&'a serde_json::Value> {
    params.get(name).or_else(|| params.get(slot))
}

fn parse_hash_at(params: &serde_json::Value, name: &str, slot: usize) -> Result<Hash, ApiQueryError> {
    let hex_str = param(params, name, slot)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiQueryError::invalid_params(&format!("Missing {} parameter", name)))?;

    parse_hash(hex_str).map_err(|e| ApiQueryError::invalid_params(&format!("Invalid {}: {}", name, e)))
}

fn file_name(file_id: FileId) -> String {
    format!("{}.dat", file_id)
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, ApiQueryError> {
    serde_json::to_value(value).map_err(|e| ApiQueryError {
        code: RPC_INTERNAL_ERROR,
        message: e.to_string(),
    })
}
