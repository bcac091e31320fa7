//! Node configuration types.
//!
//! Configuration is read from a YAML file. Every field has a default, so an
//! empty file yields a working development node.

use serde::{Deserialize, Serialize};
use solo_consensus::{EngineConfig, MempoolConfig};
use solo_program::KeyPair;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Largest accepted replay window.
pub const MAX_REPLAY_WINDOW: usize = 1024;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`NodeConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The leader key could not be built.
    #[error("invalid leader key: {0}")]
    Key(String),
}

/// Configuration for the solo node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log output format (pretty or json).
    pub log_format: String,
    /// Leader identity.
    pub leader: LeaderConfig,
    /// Consensus engine settings.
    pub engine: EngineSection,
    /// Transaction pool settings.
    pub mempool: MempoolSection,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            leader: LeaderConfig::default(),
            engine: EngineSection::default(),
            mempool: MempoolSection::default(),
        }
    }
}

/// Leader key source. With neither field set a fresh key is generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaderConfig {
    /// Hex-encoded 32-byte Ed25519 secret key.
    pub secret_key: Option<String>,
    /// Deterministic development seed.
    pub dev_seed: Option<u64>,
}

/// Engine section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Milliseconds between blocks.
    pub block_interval_ms: u64,
    /// Recent blocks checked for replayed transactions.
    pub replay_window: usize,
    /// Maximum pool transactions per block.
    pub max_txs_per_block: usize,
    /// Milliseconds allowed for each ledger or pool request.
    pub request_timeout_ms: u64,
    /// Engine mailbox capacity.
    pub mailbox_size: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            block_interval_ms: defaults.block_interval.as_millis() as u64,
            replay_window: defaults.replay_window,
            max_txs_per_block: defaults.max_txs_per_block,
            request_timeout_ms: defaults.request_timeout.as_millis() as u64,
            mailbox_size: defaults.mailbox_size,
        }
    }
}

/// Mempool section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MempoolSection {
    /// Maximum pending transactions.
    pub max_transactions: usize,
    /// Seconds before a pending transaction expires.
    pub max_transaction_age_secs: u64,
    /// Maximum transactions offered per block.
    pub max_transactions_per_block: usize,
}

impl Default for MempoolSection {
    fn default() -> Self {
        let defaults = MempoolConfig::default();
        Self {
            max_transactions: defaults.max_transactions,
            max_transaction_age_secs: defaults.max_transaction_age.as_secs(),
            max_transactions_per_block: defaults.max_transactions_per_block,
        }
    }
}

impl NodeConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parses and validates YAML.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document for a struct.
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        if !matches!(self.log_format.to_lowercase().as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "unknown log format '{}'",
                self.log_format
            )));
        }
        if self.engine.block_interval_ms == 0 {
            return Err(ConfigError::Invalid("block_interval_ms must be > 0".into()));
        }
        if self.engine.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be > 0".into()));
        }
        if self.engine.replay_window > MAX_REPLAY_WINDOW {
            return Err(ConfigError::Invalid(format!(
                "replay_window must be <= {}",
                MAX_REPLAY_WINDOW
            )));
        }
        if self.engine.mailbox_size == 0 {
            return Err(ConfigError::Invalid("mailbox_size must be > 0".into()));
        }
        if self.mempool.max_transactions == 0 {
            return Err(ConfigError::Invalid("max_transactions must be > 0".into()));
        }
        if self.leader.secret_key.is_some() && self.leader.dev_seed.is_some() {
            return Err(ConfigError::Invalid(
                "leader.secret_key and leader.dev_seed are mutually exclusive".into(),
            ));
        }
        Ok(())
    }

    /// Builds the engine configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            block_interval: Duration::from_millis(self.engine.block_interval_ms),
            replay_window: self.engine.replay_window,
            max_txs_per_block: self.engine.max_txs_per_block,
            request_timeout: Duration::from_millis(self.engine.request_timeout_ms),
            mailbox_size: self.engine.mailbox_size,
        }
    }

    /// Builds the mempool configuration.
    pub fn mempool_config(&self) -> MempoolConfig {
        MempoolConfig {
            max_transactions: self.mempool.max_transactions,
            max_transaction_age: Duration::from_secs(self.mempool.max_transaction_age_secs),
            max_transactions_per_block: self.mempool.max_transactions_per_block,
        }
    }

    /// Builds the leader key.
    pub fn leader_key(&self) -> Result<KeyPair, ConfigError> {
        match (&self.leader.secret_key, self.leader.dev_seed) {
            (Some(secret), _) => {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(secret.trim(), &mut bytes)
                    .map_err(|e| ConfigError::Key(e.to_string()))?;
                Ok(KeyPair::from_secret_bytes(bytes))
            }
            (None, Some(seed)) => Ok(KeyPair::from_seed(seed)),
            (None, None) => {
                tracing::warn!("no leader key configured, generating an ephemeral one");
                Ok(KeyPair::generate())
            }
        }
    }
}
