use crate::core::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
use crate::error::{BlockchainError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_DATA_DIR_KEY: &str = "NODE_DATA_DIR";
const NODE_ID_KEY: &str = "NODE_ID";
const NODE_PEERS_KEY: &str = "NODE_PEERS";
const MINING_DIFFICULTY_KEY: &str = "MINING_DIFFICULTY";

const LEDGER_DB_DIR: &str = "ledger";

/// Node settings. Unset fields in a TOML file keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub node_address: String,
    pub peers: Vec<String>,
    pub node_id: Option<String>,
    pub difficulty: usize,
    pub batch_size: usize,
    pub poll_interval_min_ms: u64,
    pub poll_interval_max_ms: u64,
    pub mining_idle_ms: u64,
    pub network_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            node_address: DEFAULT_NODE_ADDR.to_string(),
            peers: Vec::new(),
            node_id: None,
            difficulty: DEFAULT_DIFFICULTY,
            batch_size: 1,
            poll_interval_min_ms: 250,
            poll_interval_max_ms: 1000,
            mining_idle_ms: 100,
            network_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        debug!("Loaded configuration: {config:?}");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `NODE_*` / `MINING_DIFFICULTY` style overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node_address = addr;
        }
        if let Some(dir) = lookup(NODE_DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(node_id) = lookup(NODE_ID_KEY) {
            self.node_id = Some(node_id);
        }
        if let Some(peers) = lookup(NODE_PEERS_KEY) {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(difficulty) = lookup(MINING_DIFFICULTY_KEY) {
            self.difficulty = difficulty.trim().parse().map_err(|e| {
                BlockchainError::Config(format!("Invalid {MINING_DIFFICULTY_KEY} '{difficulty}': {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty == 0 || self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "difficulty must be between 1 and {MAX_DIFFICULTY}, got {}",
                self.difficulty
            )));
        }
        if self.batch_size == 0 {
            return Err(BlockchainError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_min_ms > self.poll_interval_max_ms {
            return Err(BlockchainError::Config(format!(
                "poll_interval_min_ms ({}) exceeds poll_interval_max_ms ({})",
                self.poll_interval_min_ms, self.poll_interval_max_ms
            )));
        }
        if self.node_id.as_deref() == Some("") {
            return Err(BlockchainError::Config(
                "node_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn get_ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_DB_DIR)
    }

    pub fn get_wallet_path(&self) -> PathBuf {
        self.data_dir.join(crate::wallet::WALLET_FILE)
    }

    pub fn get_mining_idle(&self) -> Duration {
        Duration::from_millis(self.mining_idle_ms)
    }

    pub fn get_network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(config.get_ledger_path(), PathBuf::from("data").join("ledger"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            node_address = "127.0.0.1:3005"
            peers = ["127.0.0.1:3006"]
            difficulty = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.node_address, "127.0.0.1:3005");
        assert_eq!(config.peers, vec!["127.0.0.1:3006".to_string()]);
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.batch_size, 1);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = Config::from_toml_str("difficulty = \"high\"").unwrap_err();
        assert!(matches!(err, BlockchainError::Config(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("NODE_ADDRESS", "10.0.0.1:2001"),
                ("NODE_DATA_DIR", "/tmp/forkchain"),
                ("NODE_ID", "alpha"),
                ("NODE_PEERS", "10.0.0.2:2001, 10.0.0.3:2001,"),
                ("MINING_DIFFICULTY", "4"),
            ]))
            .unwrap();
        assert_eq!(config.node_address, "10.0.0.1:2001");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/forkchain"));
        assert_eq!(config.node_id.as_deref(), Some("alpha"));
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.difficulty, 4);

        assert!(config
            .apply_overrides(lookup(&[("MINING_DIFFICULTY", "lots")]))
            .is_err());
    }

    #[test]
    fn test_validation_bounds() {
        let mut config = Config::default();
        config.difficulty = MAX_DIFFICULTY + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.poll_interval_min_ms = 2000;
        assert!(config.validate().is_err());
    }
}
