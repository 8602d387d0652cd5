//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "txindex-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TXI_SERVICE_NAME`: Service name (default: txindex-node)
    /// - `TXI_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `TXI_JSON_LOGS`: Enable JSON logs (default: false outside containers)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("TXI_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: lookup("TXI_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),

            json_logs: lookup("TXI_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::from_lookup(vars(&[]));
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_log_level_prefers_own_variable() {
        let config = TelemetryConfig::from_lookup(vars(&[
            ("TXI_LOG_LEVEL", "debug"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.log_level, "debug");

        let config = TelemetryConfig::from_lookup(vars(&[("RUST_LOG", "warn")]));
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_json_logs() {
        assert!(TelemetryConfig::from_lookup(vars(&[("TXI_JSON_LOGS", "1")])).json_logs);
        assert!(TelemetryConfig::from_lookup(vars(&[("TXI_JSON_LOGS", "TRUE")])).json_logs);
        assert!(!TelemetryConfig::from_lookup(vars(&[("TXI_JSON_LOGS", "no")])).json_logs);
        assert!(TelemetryConfig::from_lookup(vars(&[("DOCKER_CONTAINER", "1")])).json_logs);
    }
}
