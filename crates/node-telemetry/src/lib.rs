//! # Node Telemetry
//!
//! Structured logging and Prometheus metrics for the txindex node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use node_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // Logs and metrics are now being collected
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TXI_SERVICE_NAME` | `txindex-node` | Service name in log lines |
//! | `TXI_LOG_LEVEL` | `info` | Log level filter |
//! | `TXI_JSON_LOGS` | `false` | JSON log output |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};
pub use metrics::{
    encode_metrics, register_metrics, BLOCKS_RETRACTED, INDEX_WRITE_RETRIES, LOOKUP_RESULTS,
    PRUNE_BYTES_RECLAIMED, PRUNE_DELETION_FAILURES, PRUNE_FILES_DELETED, RETENTION_BOUNDARY,
    TRANSACTIONS_INDEXED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the log subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
