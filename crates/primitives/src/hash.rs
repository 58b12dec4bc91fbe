use sha2::{Digest, Sha256};

use crate::buf::Hash32;

/// SHA-256 of a single byte slice.
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash32::new(hasher.finalize().into())
}

/// SHA-256 over the concatenation of several byte slices, without an
/// intermediate allocation.
pub fn sha256_parts(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash32::new(hasher.finalize().into())
}
