use anneal_chain_types::{Account, Block};
use anneal_primitives::{Hash32, PublicKey, Signature};

use crate::accounts::AccountTable;

/// Everything needed to start a chain from nothing.
#[derive(Debug, Clone)]
pub struct GenesisConfig {
    /// Initial balances.
    pub accounts: Vec<(PublicKey, u64)>,
    pub timestamp_ns: u64,
    /// Seed mixed into every epoch's leader selection.
    pub epoch_seed: Hash32,
}

impl GenesisConfig {
    pub fn new(accounts: Vec<(PublicKey, u64)>, timestamp_ns: u64, epoch_seed: Hash32) -> Self {
        Self {
            accounts,
            timestamp_ns,
            epoch_seed,
        }
    }

    /// Build the initial account table.
    pub fn account_table(&self) -> AccountTable {
        let mut table = AccountTable::new();
        for (key, balance) in &self.accounts {
            table.put(*key, Account::with_balance(*balance));
        }
        table
    }

    /// Build the genesis block: height 0, no producer, no transactions, an
    /// empty PoH chain, and the state root of the initial accounts.
    pub fn genesis_block(&self) -> Block {
        Block {
            height: 0,
            parent_hash: Hash32::ZERO,
            producer: PublicKey::from_bytes([0; 33]),
            slot: 0,
            timestamp_ns: self.timestamp_ns,
            transactions: Vec::new(),
            poh: Vec::new(),
            state_root: self.account_table().state_root(),
            signature: Signature::default(),
        }
    }
}
