use std::{fmt, str};

use thiserror::Error;

/// A fixed 32-byte buffer used for block hashes, PoH chain values, state
/// roots, and transaction digests.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_inner(self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for Hash32 {
    /// Abbreviated form for logs, first four bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..", &hex::encode(&self.0[..4]))
    }
}

/// Error parsing a [`Hash32`] from hex.
#[derive(Debug, Error)]
pub enum ParseBufError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, got {0}")]
    WrongLength(usize),
}

impl str::FromStr for Hash32 {
    type Err = ParseBufError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s)?;
        let arr: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| ParseBufError::WrongLength(raw.len()))?;
        Ok(Self(arr))
    }
}
