use std::{collections::HashMap, fmt, sync::mpsc};

use anneal_chain_types::{Account, Transaction};
use anneal_ledger::AccountTable;
use anneal_primitives::{Hash32, PublicKey};
use thiserror::Error;
use threadpool::ThreadPool;
use tracing::debug;

use crate::batch::plan_batches;

/// Why a single transaction was excluded during execution.
///
/// Exclusions are per-transaction and never abort the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BadSignature,
    InsufficientBalance,
}

/// Fatal executor failures. Per §7 these drop the block being built, or
/// produce a NO vote during verification; they never leave partial state
/// applied (the caller discards the table on error).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A worker died without reporting a result.
    #[error("execution worker failed")]
    WorkerFailure,
    /// Balance arithmetic overflowed after the admission check. This is an
    /// unrecoverable invariant violation.
    #[error("balance overflow crediting {0}")]
    BalanceOverflow(PublicKey),
}

/// Result of executing an ordered transaction sequence.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// State root over the post-execution account table.
    pub state_root: Hash32,
    /// Transactions excluded individually, by input index.
    pub skipped: Vec<(usize, SkipReason)>,
}

enum TxOutcome {
    Applied(Vec<(PublicKey, Account)>),
    Skipped(SkipReason),
    Overflow(PublicKey),
}

/// Deterministic parallel executor over an account table.
pub struct Executor {
    pool: ThreadPool,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executor(workers={})", self.pool.max_count())
    }
}

impl Executor {
    pub fn new(workers: usize) -> Self {
        Self {
            pool: ThreadPool::new(workers.max(1)),
        }
    }

    /// Apply `txs` in order to `table` and compute the resulting state
    /// root.
    ///
    /// Batches run one after another as hard barriers; transactions inside
    /// a batch run concurrently on the pool, each owning a shard of the
    /// touched accounts. On `Err` the table must be considered corrupt and
    /// discarded by the caller; nothing partial is ever exposed.
    pub fn execute(
        &self,
        table: &mut AccountTable,
        txs: &[Transaction],
    ) -> Result<ExecutionOutput, ExecutorError> {
        let mut skipped = Vec::new();

        for batch in plan_batches(txs) {
            let (out_tx, out_rx) = mpsc::channel();

            for &idx in &batch {
                let tx = txs[idx].clone();
                let shard = snapshot_shard(table, &tx);
                let out_tx = out_tx.clone();
                self.pool.execute(move || {
                    let outcome = apply_tx(&tx, shard);
                    // receiver gone means the batch already failed
                    let _ = out_tx.send((idx, outcome));
                });
            }
            drop(out_tx);

            let mut received = 0;
            while let Ok((idx, outcome)) = out_rx.recv() {
                received += 1;
                match outcome {
                    TxOutcome::Applied(updates) => {
                        for (key, account) in updates {
                            table.put(key, account);
                        }
                    }
                    TxOutcome::Skipped(reason) => {
                        debug!(index = idx, ?reason, "transaction excluded");
                        skipped.push((idx, reason));
                    }
                    TxOutcome::Overflow(key) => {
                        return Err(ExecutorError::BalanceOverflow(key));
                    }
                }
            }
            // a panicked worker drops its sender without reporting
            if received != batch.len() {
                return Err(ExecutorError::WorkerFailure);
            }
        }

        skipped.sort_unstable_by_key(|(idx, _)| *idx);
        Ok(ExecutionOutput {
            state_root: table.state_root(),
            skipped,
        })
    }
}

/// Clone the accounts a transaction touches out of the table. Missing
/// accounts come out as zero-balance defaults and are only written back if
/// the transaction applies.
fn snapshot_shard(table: &AccountTable, tx: &Transaction) -> HashMap<PublicKey, Account> {
    let (debit, credit) = tx.effective_transfer();
    let mut shard = HashMap::with_capacity(3);
    for key in [tx.sender, debit, credit] {
        shard
            .entry(key)
            .or_insert_with(|| table.get(&key).copied().unwrap_or_default());
    }
    shard
}

/// Execute one transaction against its owned shard: signature check, then
/// balance check, then debit, credit, and sender nonce bump. Aliased keys
/// (self-transfers) collapse onto one shard entry.
fn apply_tx(tx: &Transaction, mut shard: HashMap<PublicKey, Account>) -> TxOutcome {
    if tx.verify_signature().is_err() {
        return TxOutcome::Skipped(SkipReason::BadSignature);
    }

    let (debit_key, credit_key) = tx.effective_transfer();

    let debit = shard.get_mut(&debit_key).expect("shard holds debit");
    if debit.balance < tx.amount {
        return TxOutcome::Skipped(SkipReason::InsufficientBalance);
    }
    debit.balance -= tx.amount;

    let credit = shard.get_mut(&credit_key).expect("shard holds credit");
    credit.balance = match credit.balance.checked_add(tx.amount) {
        Some(v) => v,
        None => return TxOutcome::Overflow(credit_key),
    };

    let sender = shard.get_mut(&tx.sender).expect("shard holds sender");
    sender.nonce += 1;

    TxOutcome::Applied(shard.into_iter().collect())
}
