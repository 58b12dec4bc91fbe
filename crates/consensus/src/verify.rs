use anneal_chain_types::Block;
use anneal_executor::{Executor, ExecutorError};
use anneal_ledger::{AccountTable, HeadInfo};
use anneal_poh::{verify_sequence, PohVerifyError};
use anneal_primitives::{Hash32, PublicKey};
use anneal_scheduler::{LeaderScheduler, SchedulerError};
use thiserror::Error;

/// Why a block failed verification. Each kind maps to a NO vote and a
/// blacklist entry for the (slot, hash); none of them stall the node.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("producer {got} is not the scheduled leader {expected} for slot {slot}")]
    WrongProducer {
        slot: u64,
        expected: PublicKey,
        got: PublicKey,
    },
    #[error("cannot resolve leader: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("producer signature invalid")]
    BadSignature,
    #[error("height {got} does not extend parent height {parent}")]
    HeightMismatch { parent: u64, got: u64 },
    #[error("parent hash {got} does not match chain head {head}")]
    ChainBreak { head: Hash32, got: Hash32 },
    /// The replayed chain diverged; proof of a malicious or buggy leader.
    #[error(transparent)]
    PohMismatch(#[from] PohVerifyError),
    #[error("recorded poh digests do not match the transaction order")]
    TxOrderMismatch,
    /// Local executor failure during verification; NO vote, never fatal.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    /// The leader's claimed root differs from the locally computed one.
    #[error("state root mismatch: block claims {claimed}, computed {computed}")]
    StateRootMismatch { claimed: Hash32, computed: Hash32 },
}

/// A block that passed every check, plus the state the verifier computed
/// for it. Held until the vote set finalizes or the slot is skipped.
#[derive(Debug)]
pub struct VerifiedBlock {
    pub block: Block,
    pub post_accounts: AccountTable,
    pub state_root: Hash32,
}

/// Run the full verification pipeline against the current finalized head.
///
/// Order matters: cheap structural checks run before the PoH replay, which
/// runs before re-execution.
pub fn verify_block(
    block: Block,
    head: HeadInfo,
    mut accounts: AccountTable,
    scheduler: &LeaderScheduler,
    executor: &Executor,
) -> Result<VerifiedBlock, VerifyError> {
    // 1. producer must be the scheduled leader and the signature real
    let expected = scheduler.leader_at(block.slot)?;
    if expected != block.producer {
        return Err(VerifyError::WrongProducer {
            slot: block.slot,
            expected,
            got: block.producer,
        });
    }
    if block.verify_signature().is_err() {
        return Err(VerifyError::BadSignature);
    }

    // 2. chain linkage
    if block.height != head.height + 1 {
        return Err(VerifyError::HeightMismatch {
            parent: head.height,
            got: block.height,
        });
    }
    if block.parent_hash != head.hash {
        return Err(VerifyError::ChainBreak {
            head: head.hash,
            got: block.parent_hash,
        });
    }

    // 3. PoH replay from the parent hash, byte-equal
    verify_sequence(head.hash, &block.poh)?;
    // the embedded digests must lock in exactly the recorded tx order
    let recorded: Vec<Hash32> = block.poh.iter().filter_map(|e| e.digest).collect();
    if recorded.len() != block.transactions.len()
        || recorded
            .iter()
            .zip(&block.transactions)
            .any(|(digest, tx)| *digest != tx.digest())
    {
        return Err(VerifyError::TxOrderMismatch);
    }

    // 4. re-execute and 5. compare roots
    let output = executor.execute(&mut accounts, &block.transactions)?;
    if output.state_root != block.state_root {
        return Err(VerifyError::StateRootMismatch {
            claimed: block.state_root,
            computed: output.state_root,
        });
    }

    Ok(VerifiedBlock {
        state_root: output.state_root,
        post_accounts: accounts,
        block,
    })
}
