//! Process-wide configuration (spec.md §6), layered with the `config` crate
//! the way `examples/kimberlitedb-kimberlite/crates/kimberlite-config` does:
//! struct defaults merged with unprefixed environment variables (the spec's
//! env vars, e.g. `MONGODB_URI`, `PREFETCH_COUNT`, are already unprefixed).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The full set of knobs enumerated in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mongodb_uri: Option<String>,
    pub mongodb_db: Option<String>,
    pub rabbitmq_url: Option<String>,
    pub port: u16,
    pub log_level: String,

    pub prefetch_count: u16,
    pub queue_ttl_ms: u64,
    pub dlx_ttl_ms: u64,

    pub initial_delay_sec: u64,
    pub max_retries: u32,
    pub retry_delay_sec: u64,
    pub message_timeout_sec: u64,

    pub max_simulations_in_parallel_producer: usize,
    pub max_links_in_parallel_producer: usize,
    pub simulations_consumer_max_concurrent_tasks: usize,
    pub links_consumer_max_concurrent_tasks: usize,

    pub page_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: None,
            mongodb_db: None,
            rabbitmq_url: None,
            port: 8080,
            log_level: "warning".to_string(),

            prefetch_count: 100,
            queue_ttl_ms: 600_000,
            dlx_ttl_ms: 86_400_000,

            initial_delay_sec: 2,
            max_retries: 3,
            retry_delay_sec: 5,
            message_timeout_sec: 600,

            max_simulations_in_parallel_producer: 10,
            max_links_in_parallel_producer: 100,
            simulations_consumer_max_concurrent_tasks: 10,
            links_consumer_max_concurrent_tasks: 100,

            page_size: 200,
        }
    }
}

impl AppConfig {
    /// Load defaults merged with environment variables. Fatal
    /// (`ConfigError::Missing`) if a store/broker URI is required by the
    /// selected backend but absent — callers choosing the sqlite/in-memory
    /// backends may opt out of that check via `require_external_backends`.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).map_err(|e| {
                ConfigError::Invalid(format!("failed to seed defaults: {e}"))
            })?)
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .list_separator(","),
            );

        let built = builder
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build configuration: {e}")))?;

        built
            .try_deserialize()
            .map_err(|e| ConfigError::Invalid(format!("failed to deserialize configuration: {e}")))
    }

    /// Validates that the external backends this process needs are
    /// configured. Called from the binary's startup path only — the
    /// in-memory/sqlite backends used in tests don't require it.
    pub fn require_external_backends(&self) -> Result<(), ConfigError> {
        if self.mongodb_uri.is_none() {
            return Err(ConfigError::Missing("MONGODB_URI".to_string()));
        }
        if self.rabbitmq_url.is_none() {
            return Err(ConfigError::Missing("RABBITMQ_URL".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.prefetch_count, 100);
        assert_eq!(cfg.queue_ttl_ms, 600_000);
        assert_eq!(cfg.dlx_ttl_ms, 86_400_000);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.page_size, 200);
    }

    #[test]
    fn missing_backends_is_fatal() {
        let cfg = AppConfig::default();
        assert!(cfg.require_external_backends().is_err());
    }
}
