//! Engine configuration with TOML file support.

use serde::{Deserialize, Serialize};
use strata_types::ProtocolParameters;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Configuration for one engine.
///
/// Can be loaded from a TOML file via [`EngineConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Protocol parameters shared by all replicas.
    #[serde(default)]
    pub params: ProtocolParameters,

    /// Worker threads per subsystem pool.
    #[serde(default = "default_workers_per_pool")]
    pub workers_per_pool: usize,

    /// Upper bound on blocks parked in the causal-order queue.
    #[serde(default = "default_max_pending_blocks")]
    pub max_pending_blocks: usize,

    /// Full epochs of history preserved below the latest epoch when pruning.
    #[serde(default = "default_min_retained_epochs")]
    pub min_retained_epochs: u64,

    /// Log filter applied when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_workers_per_pool() -> usize {
    2
}

fn default_max_pending_blocks() -> usize {
    16_384
}

fn default_min_retained_epochs() -> u64 {
    1
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            params: ProtocolParameters::default(),
            workers_per_pool: default_workers_per_pool(),
            max_pending_blocks: default_max_pending_blocks(),
            min_retained_epochs: default_min_retained_epochs(),
            log_filter: default_log_filter(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Initialize logging with this config's filter as the fallback.
    pub fn init_tracing(&self) {
        crate::logging::init_tracing(&self.log_filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = EngineConfig::from_toml_str("workers_per_pool = 8").unwrap();
        assert_eq!(config.workers_per_pool, 8);
        assert_eq!(config.max_pending_blocks, default_max_pending_blocks());
        assert_eq!(config.params.slots_per_epoch, 8);
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.workers_per_pool, 2);
        assert_eq!(config.min_retained_epochs, 1);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn log_filter_is_configurable() {
        let config =
            EngineConfig::from_toml_str("log_filter = \"info,strata_engine=debug\"").unwrap();
        assert_eq!(config.log_filter, "info,strata_engine=debug");
    }

    #[test]
    fn params_section_parses() {
        let config = EngineConfig::from_toml_str(
            "[params]\nslot_duration_secs = 5\nslots_per_epoch = 16\ngenesis_unix_time = 0\nmin_commit_age = 2\nattestation_commitment_offset = 2\nsync_window = 20\nwarp_sync_offset = 1\naccept_threshold_bps = 6700\nconfirm_threshold_bps = 6700\nchain_retention_slots = 100\n",
        )
        .unwrap();
        assert_eq!(config.params.slot_duration_secs, 5);
        assert_eq!(config.params.slots_per_epoch, 16);
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("workers_per_pool = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
