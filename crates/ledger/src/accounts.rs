use std::collections::BTreeMap;

use anneal_chain_types::Account;
use anneal_primitives::{sha256, Hash32, PublicKey};

/// The full account state at some chain position.
///
/// Keys are held in a `BTreeMap` so state-root enumeration is ascending by
/// key with no extra sort. Accounts are created lazily on first credit and
/// never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountTable {
    accounts: BTreeMap<PublicKey, Account>,
}

impl AccountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PublicKey) -> Option<&Account> {
        self.accounts.get(key)
    }

    pub fn balance(&self, key: &PublicKey) -> u64 {
        self.accounts.get(key).map(|a| a.balance).unwrap_or(0)
    }

    /// Insert or overwrite an account.
    pub fn put(&mut self, key: PublicKey, account: Account) {
        self.accounts.insert(key, account);
    }

    /// Credit `amount` to `key`, creating the account if absent.
    pub fn credit(&mut self, key: PublicKey, amount: u64) {
        self.accounts.entry(key).or_default().balance += amount;
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, &Account)> {
        self.accounts.iter()
    }

    /// The canonical state root: SHA-256 over `(key, balance, nonce)`
    /// records concatenated in ascending key order.
    pub fn state_root(&self) -> Hash32 {
        let mut buf = Vec::with_capacity(self.accounts.len() * 49);
        for (key, account) in &self.accounts {
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(&account.balance.to_le_bytes());
            buf.extend_from_slice(&account.nonce.to_le_bytes());
        }
        sha256(&buf)
    }
}
