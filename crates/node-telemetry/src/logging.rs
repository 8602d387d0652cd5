//! Structured logging.
//!
//! One `tracing-subscriber` registry with an `EnvFilter` and either a
//! human-readable or a JSON fmt layer. JSON lines carry:
//! - `timestamp`, `level`, `target`
//! - `fields.message` plus any structured fields of the event
//! - `span` context when inside one

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Build the filter for `config`. `RUST_LOG` style directives are accepted.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("invalid log filter {:?}: {}", config.log_level, e)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;

    let result = if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_names(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    };
    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "structured logging configured"
    );
    Ok(())
}

/// Log a block-related event with standard fields.
#[macro_export]
macro_rules! log_block_event {
    ($level:ident, $component:expr, $msg:expr, $block_height:expr, $block_hash:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = $component,
            block_height = $block_height,
            block_hash = %$block_hash,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_directives() {
        let config = TelemetryConfig {
            log_level: "info,tx_indexing=debug".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(env_filter(&config).is_ok());
    }

    #[test]
    fn test_filter_rejects_garbage() {
        let config = TelemetryConfig {
            log_level: "tx_indexing=notalevel".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(env_filter(&config), Err(TelemetryError::Config(_))));
    }
}
