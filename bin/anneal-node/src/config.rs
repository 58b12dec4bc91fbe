use std::{net::SocketAddr, path::{Path, PathBuf}, str::FromStr};

use anneal_ledger::GenesisConfig;
use anneal_params::Params;
use anneal_primitives::{Hash32, PublicKey};
use eyre::{eyre, Context};
use serde::Deserialize;

/// One pre-funded account in the genesis section.
#[derive(Debug, Deserialize)]
pub struct GenesisAccount {
    /// Hex compressed public key.
    pub key: String,
    pub balance: u64,
}

/// Genesis section of the node config.
#[derive(Debug, Deserialize)]
pub struct GenesisSection {
    pub timestamp_ns: u64,
    /// Hex 32-byte seed mixed into leader selection.
    pub epoch_seed: String,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

/// Top-level node configuration, loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    /// Path to the hex-encoded 32-byte signing key.
    pub key_path: PathBuf,
    /// Path to the JSON peer directory.
    pub peers_path: PathBuf,
    /// UDP address for shreds, votes, and transaction ingress.
    pub listen_addr: SocketAddr,
    pub genesis: GenesisSection,
    /// Protocol parameter overrides; defaults apply when absent.
    #[serde(default)]
    pub params: Option<Params>,
}

impl NodeConfig {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).wrap_err("parsing config")
    }

    pub fn params(&self) -> Params {
        self.params.clone().unwrap_or_default()
    }

    /// Materialize the genesis section.
    pub fn genesis_config(&self) -> eyre::Result<GenesisConfig> {
        let epoch_seed =
            Hash32::from_str(&self.genesis.epoch_seed).wrap_err("parsing genesis.epoch_seed")?;
        let accounts = self
            .genesis
            .accounts
            .iter()
            .map(|acct| {
                let key = PublicKey::from_str(&acct.key)
                    .map_err(|_| eyre!("invalid genesis account key {}", acct.key))?;
                Ok((key, acct.balance))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(GenesisConfig::new(
            accounts,
            self.genesis.timestamp_ns,
            epoch_seed,
        ))
    }
}
