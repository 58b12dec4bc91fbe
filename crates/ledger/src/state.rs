use std::sync::Arc;

use anneal_chain_types::{Block, Vote};
use anneal_primitives::Hash32;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::{
    accounts::AccountTable,
    chain::{ChainStore, FinalizedBlock, HeadInfo, LedgerError},
    genesis::GenesisConfig,
};

/// The shared ledger state: finalized chain plus the account table at the
/// finalized head.
///
/// This is the one value every component holds a handle to; there are no
/// back-pointers between components. The finalization step is the only
/// writer; everyone else reads snapshots.
#[derive(Debug)]
pub struct LedgerState {
    chain: ChainStore,
    accounts: RwLock<AccountTable>,
    epoch_seed: Hash32,
}

impl LedgerState {
    /// Initialize from genesis.
    pub fn from_genesis(genesis: &GenesisConfig) -> Arc<Self> {
        Arc::new(Self {
            chain: ChainStore::new(genesis.genesis_block()),
            accounts: RwLock::new(genesis.account_table()),
            epoch_seed: genesis.epoch_seed,
        })
    }

    pub fn chain(&self) -> &ChainStore {
        &self.chain
    }

    pub fn epoch_seed(&self) -> Hash32 {
        self.epoch_seed
    }

    pub fn head(&self) -> HeadInfo {
        self.chain.head()
    }

    /// Subscribe to finalized-head updates.
    pub fn subscribe(&self) -> watch::Receiver<HeadInfo> {
        self.chain.subscribe()
    }

    /// Clone the account table at the finalized head. Builders and
    /// verifiers execute against this snapshot.
    pub fn snapshot_accounts(&self) -> AccountTable {
        self.accounts.read().clone()
    }

    /// State root at the finalized head.
    pub fn state_root(&self) -> Hash32 {
        self.accounts.read().state_root()
    }

    /// Commit a finalized block: append it to the chain and install the
    /// post-execution account table. `post_accounts` must be the executor
    /// output for this block over the previous head state.
    pub fn commit_block(
        &self,
        block: Block,
        votes: Vec<Vote>,
        post_accounts: AccountTable,
    ) -> Result<HeadInfo, LedgerError> {
        // Take the account write lock across the append so a reader never
        // sees a new head with the old table.
        let mut accounts = self.accounts.write();
        let head = self.chain.append(block, votes)?;
        *accounts = post_accounts;
        Ok(head)
    }

    pub fn get_by_hash(&self, hash: &Hash32) -> Option<FinalizedBlock> {
        self.chain.get_by_hash(hash)
    }
}
