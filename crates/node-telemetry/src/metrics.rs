//! Prometheus metrics for the txindex node.
//!
//! All metrics follow the naming convention: `txi_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., prune_files_deleted_total)
//! - **Gauge**: Value that can go up or down (e.g., prune_retention_boundary)

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // INDEX METRICS
    // =========================================================================

    /// Total transaction entries written by block connections
    pub static ref TRANSACTIONS_INDEXED: Counter = Counter::new(
        "txi_index_transactions_indexed_total",
        "Total transaction entries written to the index"
    ).expect("metric creation failed");

    /// Blocks retracted by reorganizations
    pub static ref BLOCKS_RETRACTED: Counter = Counter::new(
        "txi_index_blocks_retracted_total",
        "Total blocks removed from the index by reorganizations"
    ).expect("metric creation failed");

    /// Chain events whose index write failed and was retried
    pub static ref INDEX_WRITE_RETRIES: Counter = Counter::new(
        "txi_index_write_retries_total",
        "Total failed index writes retried by the block-connection worker"
    ).expect("metric creation failed");

    // =========================================================================
    // LOOKUP METRICS
    // =========================================================================

    /// Lookup results by outcome
    pub static ref LOOKUP_RESULTS: CounterVec = CounterVec::new(
        Opts::new("txi_lookup_results_total", "Transaction lookups by outcome"),
        &["outcome"]  // outcome: found/not_found/pruned/storage_error
    ).expect("metric creation failed");

    // =========================================================================
    // PRUNING METRICS
    // =========================================================================

    /// Block files deleted
    pub static ref PRUNE_FILES_DELETED: Counter = Counter::new(
        "txi_prune_files_deleted_total",
        "Total block files deleted by pruning"
    ).expect("metric creation failed");

    /// Bytes reclaimed
    pub static ref PRUNE_BYTES_RECLAIMED: Counter = Counter::new(
        "txi_prune_bytes_reclaimed_total",
        "Total bytes reclaimed by pruning"
    ).expect("metric creation failed");

    /// Deletions that failed and will be retried
    pub static ref PRUNE_DELETION_FAILURES: Counter = Counter::new(
        "txi_prune_deletion_failures_total",
        "Total block file deletions that failed"
    ).expect("metric creation failed");

    /// Lowest height whose data may still exist
    pub static ref RETENTION_BOUNDARY: Gauge = Gauge::new(
        "txi_prune_retention_boundary",
        "Current retention boundary height"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Index
        Box::new(TRANSACTIONS_INDEXED.clone()),
        Box::new(BLOCKS_RETRACTED.clone()),
        Box::new(INDEX_WRITE_RETRIES.clone()),
        // Lookup
        Box::new(LOOKUP_RESULTS.clone()),
        // Pruning
        Box::new(PRUNE_FILES_DELETED.clone()),
        Box::new(PRUNE_BYTES_RECLAIMED.clone()),
        Box::new(PRUNE_DELETION_FAILURES.clone()),
        Box::new(RETENTION_BOUNDARY.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
