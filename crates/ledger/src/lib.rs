//! Ledger state: the account table with its canonical state root, the
//! append-only finalized chain, and the finalized-head subscription.

pub mod accounts;
pub mod chain;
pub mod genesis;
pub mod state;

pub use accounts::AccountTable;
pub use chain::{ChainStore, FinalizedBlock, HeadInfo, LedgerError};
pub use genesis::GenesisConfig;
pub use state::LedgerState;
