use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

static DEFAULT_P2P_ADDRESS: &str = "127.0.0.1:6001";
static DEFAULT_KEY_PATH: &str = "node/wallet/private_key";
static DEFAULT_DATA_DIR: &str = "node/data";

const P2P_ADDRESS_KEY: &str = "P2P_ADDRESS";
const PEERS_KEY: &str = "PEERS";
const KEY_PATH_KEY: &str = "KEY_PATH";
const DATA_DIR_KEY: &str = "DATA_DIR";
const MINE_KEY: &str = "MINE";

/// Node settings: defaults, then an optional TOML file, then environment variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the peer listener binds to
    pub p2p_address: String,
    /// Peers dialled at startup
    pub peers: Vec<String>,
    pub key_path: PathBuf,
    /// Directory of the chain store
    pub data_dir: PathBuf,
    /// Mine continuously in the background
    pub mine: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            p2p_address: DEFAULT_P2P_ADDRESS.to_string(),
            peers: vec![],
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            mine: false,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `lookup`, which maps a variable name to its value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(P2P_ADDRESS_KEY) {
            self.p2p_address = addr;
        }
        if let Some(peers) = lookup(PEERS_KEY) {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = lookup(KEY_PATH_KEY) {
            self.key_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(mine) = lookup(MINE_KEY) {
            self.mine = parse_flag(MINE_KEY, &mine)?;
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(BlockchainError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}
