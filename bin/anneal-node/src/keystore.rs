use std::path::Path;

use anneal_primitives::Keypair;
use eyre::{eyre, Context};

/// Load the node signing key from a hex-encoded 32-byte secret file.
pub fn load_keypair(path: &Path) -> eyre::Result<Keypair> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading key file {}", path.display()))?;
    let bytes = hex::decode(raw.trim()).wrap_err("key file is not hex")?;
    Keypair::from_secret_bytes(&bytes).map_err(|err| eyre!("invalid secret key: {err}"))
}

/// Generate a fresh keypair and write it where the config expects it.
/// Refuses to overwrite an existing key.
pub fn generate_keypair(path: &Path) -> eyre::Result<Keypair> {
    if path.exists() {
        return Err(eyre!("refusing to overwrite existing key {}", path.display()));
    }
    let keypair = Keypair::generate();
    std::fs::write(path, hex::encode(keypair.secret_bytes()))
        .wrap_err_with(|| format!("writing key file {}", path.display()))?;
    Ok(keypair)
}
