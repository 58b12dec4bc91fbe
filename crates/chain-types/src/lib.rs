//! Core chain data model: transactions, accounts, PoH entries, blocks,
//! shreds, votes, validator records, and leader schedules, together with
//! their canonical wire encodings.

pub mod account;
pub mod block;
pub mod poh;
pub mod schedule;
pub mod shred;
pub mod transaction;
pub mod validator;
pub mod vote;

pub use account::{stake_pool_key, Account};
pub use block::Block;
pub use poh::PohEntry;
pub use schedule::LeaderSchedule;
pub use shred::{Shred, ShredKind};
pub use transaction::{Transaction, TxKind};
pub use validator::{HealthMetrics, ValidatorRecord};
pub use vote::Vote;
