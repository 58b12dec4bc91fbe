use std::{sync::Arc, time::Duration};

use anneal_chain_types::Block;
use anneal_executor::Executor;
use anneal_ledger::LedgerState;
use anneal_mempool::Mempool;
use anneal_params::Params;
use anneal_primitives::Keypair;
use anneal_scheduler::{now_ns, LeaderScheduler};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::block::{build_block, BlockAssemblyInputs};

/// Everything the leader loop needs, threaded in explicitly.
pub struct LeaderLoopContext {
    pub params: Arc<Params>,
    pub keypair: Arc<Keypair>,
    pub scheduler: Arc<LeaderScheduler>,
    pub ledger: Arc<LedgerState>,
    pub mempool: Arc<Mempool>,
    pub executor: Arc<Executor>,
    /// Built blocks go here; the node fans them out to the propagator and
    /// the local verification pipeline.
    pub block_tx: mpsc::Sender<Block>,
}

impl std::fmt::Debug for LeaderLoopContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LeaderLoopContext({})", self.keypair.public_key())
    }
}

/// The per-slot production loop.
///
/// Wakes at every slot boundary, keeps the schedule window covered and the
/// mempool pruned, and produces exactly one block whenever the local node
/// is the scheduled leader. A fatal executor error skips the slot with
/// nothing emitted; the next leader builds on the unchanged parent.
pub async fn leader_loop(ctx: LeaderLoopContext) {
    let clock = ctx.scheduler.clock();
    let our_key = ctx.keypair.public_key();

    loop {
        let now = now_ns();
        let (slot, remaining) = clock.slot_at(now);

        if let Err(err) = ctx.scheduler.ensure_coverage(now) {
            error!(?err, slot, "cannot extend leader schedule");
        }
        ctx.mempool.evict_expired(slot);

        match ctx.scheduler.leader_at(slot) {
            Ok(leader) if leader == our_key => {
                build_and_emit(&ctx, slot).await;
            }
            Ok(leader) => {
                debug!(slot, %leader, "not our slot");
            }
            Err(err) => {
                warn!(?err, slot, "no leader for slot");
            }
        }

        // sleep into the next slot
        tokio::time::sleep(remaining + Duration::from_millis(1)).await;
    }
}

/// Build this slot's block and hand it off. Never produces twice for one
/// slot: the loop only enters once per slot boundary.
async fn build_and_emit(ctx: &LeaderLoopContext, slot: u64) {
    let parent = ctx.ledger.head();
    let accounts = ctx.ledger.snapshot_accounts();
    let candidates = ctx.mempool.drain(slot, ctx.params.max_block_txs);
    let deadline_ns = ctx.scheduler.clock().slot_end_ns(slot);

    info!(
        slot,
        parent_height = parent.height,
        candidates = candidates.len(),
        "leading slot, building block"
    );

    // the build is pure CPU (hashing + execution); keep it off the runtime
    let params = ctx.params.clone();
    let keypair = ctx.keypair.clone();
    let ledger = ctx.ledger.clone();
    let executor = ctx.executor.clone();
    let build = tokio::task::spawn_blocking(move || {
        let inputs = BlockAssemblyInputs {
            parent,
            accounts,
            candidates,
            slot,
            timestamp_ns: now_ns(),
            params: &params,
        };
        build_block(inputs, &executor, &ledger, &keypair)
    });

    let outputs = match build.await {
        Ok(Ok(outputs)) => outputs,
        Ok(Err(err)) => {
            // executor failure: abort the slot, emit nothing
            error!(?err, slot, "block build failed, skipping slot");
            return;
        }
        Err(err) => {
            error!(?err, slot, "block build task died, skipping slot");
            return;
        }
    };

    if now_ns() > deadline_ns {
        // receivers may still accept it since we were the scheduled
        // leader for the slot the block names
        warn!(slot, "block finished after the slot deadline");
    }

    if ctx.block_tx.send(outputs.block).await.is_err() {
        error!(slot, "block channel closed, dropping built block");
    }
}
