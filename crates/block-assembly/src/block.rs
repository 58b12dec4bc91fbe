use anneal_chain_types::{Block, Transaction};
use anneal_executor::{Executor, ExecutorError};
use anneal_ledger::{AccountTable, HeadInfo, LedgerState};
use anneal_params::Params;
use anneal_poh::PohRecorder;
use anneal_primitives::{Keypair, Signature};
use thiserror::Error;
use tracing::{debug, warn};

/// All inputs that control the next built block.
#[derive(Debug)]
pub struct BlockAssemblyInputs<'a> {
    /// Finalized head the block extends.
    pub parent: HeadInfo,
    /// Account state at the parent.
    pub accounts: AccountTable,
    /// Candidate transactions in arrival order. Inadmissible entries are
    /// excluded individually, never failing the build.
    pub candidates: Vec<Transaction>,
    pub slot: u64,
    pub timestamp_ns: u64,
    pub params: &'a Params,
}

/// Outputs from block assembly.
#[derive(Debug)]
pub struct BlockAssemblyOutputs {
    /// The signed block.
    pub block: Block,
    /// Account state after applying the block.
    pub post_accounts: AccountTable,
    /// Candidates excluded at admission.
    pub excluded: usize,
}

/// Fatal build failures. Per-transaction problems never land here; an
/// executor failure aborts the slot with nothing emitted.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Build the block for `slot`.
///
/// The sequence within the slot:
/// 1. reset PoH with the parent block hash;
/// 2. per admissible transaction, in arrival order: at least one tick,
///    then ingest the transaction digest;
/// 3. trailing ticks (minimum three) padded up to the density floor;
/// 4. execute the ordered list and take the state root;
/// 5. assemble and sign.
pub fn build_block(
    inputs: BlockAssemblyInputs<'_>,
    executor: &Executor,
    ledger: &LedgerState,
    keypair: &Keypair,
) -> Result<BlockAssemblyOutputs, BuildError> {
    let BlockAssemblyInputs {
        parent,
        accounts,
        candidates,
        slot,
        timestamp_ns,
        params,
    } = inputs;

    let mut poh = PohRecorder::new(parent.hash);
    let candidate_count = candidates.len();
    let admitted = admit_candidates(candidates, &accounts, ledger, slot, params);
    let excluded = candidate_count - admitted.len();

    for tx in &admitted {
        poh.tick();
        poh.record(tx.digest());
    }
    for _ in 0..params.poh_trailing_ticks {
        poh.tick();
    }
    while (poh.len() as u64) < params.poh_min_ticks_per_slot() {
        poh.tick();
    }

    let mut post_accounts = accounts;
    let output = executor.execute(&mut post_accounts, &admitted)?;
    if !output.skipped.is_empty() {
        // admission already simulated balances; a skip here means the
        // projection and executor disagree
        warn!(
            slot,
            skipped = output.skipped.len(),
            "executor excluded transactions the admission pass let through"
        );
    }

    let mut block = Block {
        height: parent.height + 1,
        parent_hash: parent.hash,
        producer: keypair.public_key(),
        slot,
        timestamp_ns,
        transactions: admitted,
        poh: poh.into_entries(),
        state_root: output.state_root,
        signature: Signature::default(),
    };
    block.sign(keypair);

    debug!(
        slot,
        height = block.height,
        txs = block.transactions.len(),
        excluded,
        "assembled block"
    );

    Ok(BlockAssemblyOutputs {
        block,
        post_accounts,
        excluded,
    })
}

/// Filter candidates down to the admissible subset, in arrival order.
///
/// Admissible means: valid signature, recent blockhash resolving inside
/// the window as of `slot`, and sufficient projected balance given every
/// earlier admitted transaction. There is no count limit unless the
/// `max_block_txs` knob is set.
fn admit_candidates(
    candidates: Vec<Transaction>,
    accounts: &AccountTable,
    ledger: &LedgerState,
    slot: u64,
    params: &Params,
) -> Vec<Transaction> {
    let mut projection = accounts.clone();
    let mut admitted = Vec::with_capacity(candidates.len());

    for tx in candidates {
        if let Some(cap) = params.max_block_txs {
            if admitted.len() >= cap {
                break;
            }
        }
        if tx.verify_signature().is_err() {
            debug!(id = tx.id, "candidate excluded: bad signature");
            continue;
        }
        if !ledger
            .chain()
            .blockhash_is_recent(&tx.recent_blockhash, slot, params.blockhash_window_slots)
        {
            debug!(id = tx.id, "candidate excluded: stale blockhash");
            continue;
        }
        let (debit, credit) = tx.effective_transfer();
        if projection.balance(&debit) < tx.amount {
            debug!(id = tx.id, "candidate excluded: insufficient balance");
            continue;
        }
        // mirror the executor: debit, credit, nonce
        let mut debit_acct = projection.get(&debit).copied().unwrap_or_default();
        debit_acct.balance -= tx.amount;
        projection.put(debit, debit_acct);
        projection.credit(credit, tx.amount);
        let mut sender_acct = projection.get(&tx.sender).copied().unwrap_or_default();
        sender_acct.nonce += 1;
        projection.put(tx.sender, sender_acct);

        admitted.push(tx);
    }
    admitted
}
