use std::{collections::HashMap, sync::Arc};

use anneal_chain_types::{Block, Vote};
use anneal_executor::Executor;
use anneal_ledger::LedgerState;
use anneal_params::Params;
use anneal_primitives::{Hash32, Keypair, PublicKey};
use anneal_scheduler::{now_ns, LeaderScheduler};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    tracker::{BlockPhase, BlockTracker},
    verify::{verify_block, VerifiedBlock, VerifyError},
    votes::{VoteAggregator, VoteOutcome},
};

/// Outbound vote transport; the node binary provides the network
/// implementation.
#[async_trait]
pub trait VoteSink: Send + Sync {
    async fn broadcast_vote(&self, vote: &Vote);
}

/// Dependencies of the consensus task, threaded in explicitly.
pub struct ConsensusContext {
    pub params: Arc<Params>,
    pub keypair: Arc<Keypair>,
    pub scheduler: Arc<LeaderScheduler>,
    pub ledger: Arc<LedgerState>,
    pub executor: Arc<Executor>,
    pub vote_sink: Arc<dyn VoteSink>,
}

impl std::fmt::Debug for ConsensusContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConsensusContext({})", self.keypair.public_key())
    }
}

/// Handle for feeding the consensus task.
#[derive(Clone)]
pub struct ConsensusHandle {
    block_tx: mpsc::Sender<Block>,
    vote_tx: mpsc::Sender<Vote>,
    aggregator: Arc<VoteAggregator>,
    ledger: Arc<LedgerState>,
}

impl std::fmt::Debug for ConsensusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConsensusHandle")
    }
}

impl ConsensusHandle {
    /// Submit a reconstructed (or locally built) block for verification.
    pub async fn deliver_block(&self, block: Block) -> eyre::Result<()> {
        self.block_tx.send(block).await.map_err(Into::into)
    }

    /// The vote admission endpoint. Admission is synchronous; an admitted
    /// vote additionally wakes the task to re-check quorum.
    pub async fn submit_vote(&self, vote: Vote) -> VoteOutcome {
        let outcome = self
            .aggregator
            .admit(vote, now_ns(), self.ledger.head().slot);
        if matches!(outcome, VoteOutcome::Admitted { .. }) {
            let _ = self.vote_tx.send(vote).await;
        }
        outcome
    }

    pub fn aggregator(&self) -> &Arc<VoteAggregator> {
        &self.aggregator
    }
}

/// Result of one spawned verification.
struct Verified {
    slot: u64,
    hash: Hash32,
    producer: PublicKey,
    result: Result<VerifiedBlock, VerifyError>,
}

/// Create the consensus task and its handle.
pub fn build_consensus_task(
    ctx: ConsensusContext,
) -> (ConsensusHandle, impl std::future::Future<Output = ()>) {
    let (block_tx, block_rx) = mpsc::channel(64);
    let (vote_tx, vote_rx) = mpsc::channel(256);
    let aggregator = Arc::new(VoteAggregator::new(
        ctx.params.clone(),
        ctx.scheduler.registry().clone(),
    ));

    let handle = ConsensusHandle {
        block_tx,
        vote_tx,
        aggregator: aggregator.clone(),
        ledger: ctx.ledger.clone(),
    };
    let task = consensus_task(ctx, aggregator, block_rx, vote_rx);
    (handle, task)
}

/// The single-threaded aggregation loop.
///
/// Verification is CPU-heavy and runs on blocking tasks, one per inbound
/// block; their results, incoming votes, and a housekeeping tick all feed
/// this loop. Priority: verification results, then blocks, then votes.
async fn consensus_task(
    ctx: ConsensusContext,
    aggregator: Arc<VoteAggregator>,
    mut block_rx: mpsc::Receiver<Block>,
    mut vote_rx: mpsc::Receiver<Vote>,
) {
    let (verified_tx, mut verified_rx) = mpsc::channel::<Verified>(64);
    let mut pending: HashMap<(u64, Hash32), VerifiedBlock> = HashMap::new();
    let tracker = BlockTracker::new();
    let mut housekeeping = tokio::time::interval(ctx.params.slot_duration / 2);
    housekeeping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            Some(verified) = verified_rx.recv() => {
                handle_verified(&ctx, &aggregator, &tracker, &mut pending, verified).await;
            }
            Some(block) = block_rx.recv() => {
                handle_block(&ctx, &tracker, &verified_tx, block);
            }
            Some(vote) = vote_rx.recv() => {
                ctx.scheduler.registry().note_seen(&vote.validator, now_ns());
                try_finalize(&ctx, &aggregator, &tracker, &mut pending, vote.slot, vote.block_hash);
            }
            _ = housekeeping.tick() => {
                housekeep(&ctx, &aggregator, &tracker, &mut pending);
            }
            else => break,
        }
    }
}

/// Kick off verification of an inbound block on the blocking pool.
fn handle_block(
    ctx: &ConsensusContext,
    tracker: &BlockTracker,
    verified_tx: &mpsc::Sender<Verified>,
    block: Block,
) {
    let slot = block.slot;
    let hash = block.hash();
    let head = ctx.ledger.head();

    if slot <= head.slot {
        debug!(slot, %hash, "ignoring block for already-finalized slot");
        return;
    }
    if !tracker.observe(slot, hash) {
        debug!(slot, %hash, "ignoring already-seen block");
        return;
    }

    let scheduler = ctx.scheduler.clone();
    let executor = ctx.executor.clone();
    let ledger = ctx.ledger.clone();
    let verified_tx = verified_tx.clone();
    let producer = block.producer;

    tokio::spawn(async move {
        let result = tokio::task::spawn_blocking(move || {
            // snapshot head and accounts as late as possible
            let head = ledger.head();
            let accounts = ledger.snapshot_accounts();
            verify_block(block, head, accounts, &scheduler, &executor)
        })
        .await;

        let result = match result {
            Ok(inner) => inner,
            Err(err) => {
                error!(?err, slot, "verification task died");
                return;
            }
        };
        let _ = verified_tx
            .send(Verified {
                slot,
                hash,
                producer,
                result,
            })
            .await;
    });
}

/// Process a verification verdict: vote on success, blacklist on failure.
async fn handle_verified(
    ctx: &ConsensusContext,
    aggregator: &Arc<VoteAggregator>,
    tracker: &BlockTracker,
    pending: &mut HashMap<(u64, Hash32), VerifiedBlock>,
    verified: Verified,
) {
    let Verified {
        slot,
        hash,
        producer,
        result,
    } = verified;

    let verified_block = match result {
        Ok(vb) => vb,
        Err(err) => {
            match &err {
                VerifyError::StateRootMismatch { .. } => {
                    // consensus divergence: the leader cheated or errored
                    error!(slot, %hash, %err, "state root divergence, voting NO");
                }
                VerifyError::PohMismatch(_) | VerifyError::TxOrderMismatch => {
                    error!(slot, %hash, %err, "poh replay failed, voting NO");
                }
                _ => warn!(slot, %hash, %err, "block rejected"),
            }
            tracker.advance(slot, hash, BlockPhase::Rejected);
            ctx.scheduler.registry().note_proposal(&producer, false);
            return;
        }
    };

    tracker.advance(slot, hash, BlockPhase::Verified);

    let vote = Vote::new_signed(&ctx.keypair, slot, hash, verified_block.state_root);
    pending.insert((slot, hash), verified_block);
    tracker.advance(slot, hash, BlockPhase::Voted);

    // our own vote enters the aggregate directly; everyone else hears it
    // through the sink
    let outcome = aggregator.admit(vote, now_ns(), ctx.ledger.head().slot);
    debug!(slot, %hash, ?outcome, "cast local vote");
    ctx.vote_sink.broadcast_vote(&vote).await;

    try_finalize(ctx, aggregator, tracker, pending, slot, hash);
}

/// Finalize the block if its matching YES votes reach quorum.
fn try_finalize(
    ctx: &ConsensusContext,
    aggregator: &Arc<VoteAggregator>,
    tracker: &BlockTracker,
    pending: &mut HashMap<(u64, Hash32), VerifiedBlock>,
    slot: u64,
    hash: Hash32,
) {
    let Some(vb) = pending.get(&(slot, hash)) else {
        return;
    };
    if !aggregator.reached_quorum(slot, hash, vb.state_root, now_ns()) {
        return;
    }

    let vb = pending.remove(&(slot, hash)).expect("pending entry exists");
    let votes = aggregator.matching_votes(slot, hash, vb.state_root);
    let producer = vb.block.producer;

    match ctx.ledger.commit_block(vb.block, votes, vb.post_accounts) {
        Ok(head) => {
            info!(slot, height = head.height, %hash, "block finalized on quorum");
            tracker.advance(slot, hash, BlockPhase::Finalized);
            ctx.scheduler.registry().note_proposal(&producer, true);
            // competing pending entries at or below this slot are dead
            pending.retain(|(s, _), _| *s > slot);
            aggregator.prune_below(slot);
            tracker.prune_below(slot);
        }
        Err(err) => {
            error!(slot, %hash, ?err, "finalized block failed to append");
            tracker.advance(slot, hash, BlockPhase::Rejected);
        }
    }
}

/// Slot-tick housekeeping: drop pending blocks whose slot passed without
/// quorum (the slot is skipped, visible as a gap in the finalized head
/// subscription) and keep the schedule window covered.
fn housekeep(
    ctx: &ConsensusContext,
    aggregator: &Arc<VoteAggregator>,
    tracker: &BlockTracker,
    pending: &mut HashMap<(u64, Hash32), VerifiedBlock>,
) {
    let now = now_ns();
    let (current_slot, _) = ctx.scheduler.clock().slot_at(now);
    let grace_slots =
        (ctx.params.quorum_grace.as_nanos() / ctx.params.slot_duration.as_nanos().max(1)) as u64 + 1;

    pending.retain(|(slot, hash), vb| {
        let expired = slot + grace_slots < current_slot;
        if expired {
            warn!(
                slot,
                %hash,
                votes = aggregator.matching_votes(*slot, *hash, vb.state_root).len(),
                "no quorum within slot plus grace, treating slot as skipped"
            );
            ctx.scheduler
                .registry()
                .note_proposal(&vb.block.producer, false);
        }
        !expired
    });

    let head_slot = ctx.ledger.head().slot;
    aggregator.prune_below(head_slot);
    tracker.prune_below(head_slot);

    if let Err(err) = ctx.scheduler.ensure_coverage(now) {
        warn!(?err, "schedule coverage maintenance failed");
    }
}
