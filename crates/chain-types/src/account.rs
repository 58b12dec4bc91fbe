use anneal_primitives::PublicKey;

/// Ledger account. Created lazily on first credit, never destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    /// Current balance. Never negative; execution excludes any transaction
    /// that would overdraw.
    pub balance: u64,
    /// Last-seen nonce, bumped once per executed transaction sent by this
    /// account.
    pub nonce: u64,
}

impl Account {
    pub fn with_balance(balance: u64) -> Self {
        Self { balance, nonce: 0 }
    }
}

/// The reserved system account that stake flows through.
///
/// This is not a spendable key; no signature can verify under it.
pub fn stake_pool_key() -> PublicKey {
    PublicKey::from_bytes([0u8; 33])
}
