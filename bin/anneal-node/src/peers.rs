use std::{net::SocketAddr, path::Path, str::FromStr, sync::Arc, time::Duration};

use anneal_chain_types::ValidatorRecord;
use anneal_primitives::PublicKey;
use anneal_scheduler::ValidatorRegistry;
use eyre::Context;
use serde::Deserialize;
use tracing::{info, warn};

/// One entry of the JSON peer directory.
#[derive(Debug, Deserialize)]
struct PeerEntry {
    /// Hex compressed public key.
    key: String,
    address: SocketAddr,
    stake: u64,
}

/// Load the peer directory and merge it into the registry.
///
/// The directory is maintained by an out-of-process gossip layer and is
/// eventually consistent; unknown or malformed entries are skipped with a
/// warning rather than failing the node.
pub fn load_peers(path: &Path, registry: &ValidatorRegistry) -> eyre::Result<usize> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading peer directory {}", path.display()))?;
    let entries: Vec<PeerEntry> = serde_json::from_str(&raw).wrap_err("parsing peer directory")?;

    let mut loaded = 0;
    for entry in entries {
        match PublicKey::from_str(&entry.key) {
            Ok(key) => {
                registry.upsert(ValidatorRecord::new(key, entry.stake, entry.address));
                loaded += 1;
            }
            Err(err) => {
                warn!(key = %entry.key, ?err, "skipping malformed peer entry");
            }
        }
    }
    Ok(loaded)
}

/// Periodically re-read the peer directory so gossip updates land without
/// a restart.
pub async fn peer_refresh_task(
    path: std::path::PathBuf,
    registry: Arc<ValidatorRegistry>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match load_peers(&path, &registry) {
            Ok(count) => info!(count, "peer directory refreshed"),
            Err(err) => warn!(?err, "peer directory refresh failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use anneal_primitives::Keypair;

    use super::*;

    #[test]
    fn loads_and_skips_malformed() {
        let good = Keypair::generate().public_key();
        let json = format!(
            r#"[
  {{"key": "{}", "address": "10.0.0.1:7200", "stake": 500}},
  {{"key": "nonsense", "address": "10.0.0.2:7200", "stake": 1}}
]"#,
            hex::encode(good.as_bytes())
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.json");
        std::fs::write(&path, json).unwrap();

        let registry = ValidatorRegistry::new();
        let loaded = load_peers(&path, &registry).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(registry.get(&good).unwrap().stake, 500);
    }
}
