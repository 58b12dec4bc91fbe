use std::{net::SocketAddr, sync::Arc};

use anneal_chain_types::{Block, Shred};
use anneal_params::Params;
use anneal_primitives::{Keypair, PublicKey};
use anneal_scheduler::{now_ns, LeaderScheduler};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::{
    buffers::{InsertOutcome, ReassemblyBuffers},
    shredder::{make_shreds, TurbineError},
    topology::TurbineTree,
};

/// Outbound shred transport. The node binary provides the UDP
/// implementation; tests use an in-memory one.
#[async_trait]
pub trait ShredSink: Send + Sync {
    async fn send_shred(&self, to: SocketAddr, shred: &Shred);
}

/// Leader-side broadcast: shred the block and send each shred to its
/// assigned layer-1 validator. Upstream bandwidth is the block bytes once
/// (plus redundancy); the tree fans the rest out.
pub async fn broadcast_block(
    block: &Block,
    keypair: &Keypair,
    tree: &TurbineTree,
    params: &Params,
    sink: &dyn ShredSink,
) -> Result<(), TurbineError> {
    let shreds = make_shreds(block, keypair, params)?;
    info!(
        hash = %block.hash(),
        slot = block.slot,
        data = shreds.first().map(|s| s.total_data).unwrap_or(0),
        recovery = shreds.first().map(|s| s.total_recovery).unwrap_or(0),
        "broadcasting shredded block"
    );
    for shred in &shreds {
        match tree.root_target(shred.index) {
            Some(target) => sink.send_shred(target.address, shred).await,
            None => {
                // a lone validator network has nobody to send to
                debug!(index = shred.index, "no layer-1 target for shred");
            }
        }
    }
    Ok(())
}

/// Context for the inbound shred task.
pub struct ReceiveContext {
    pub params: Arc<Params>,
    pub scheduler: Arc<LeaderScheduler>,
    pub buffers: Arc<ReassemblyBuffers>,
    /// Local validator key; positions us in the forwarding tree.
    pub local_key: PublicKey,
    pub sink: Arc<dyn ShredSink>,
    /// Reconstructed blocks are delivered here for verification.
    pub block_tx: mpsc::Sender<Block>,
}

impl std::fmt::Debug for ReceiveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReceiveContext({})", self.local_key)
    }
}

/// Inbound shred processing loop.
///
/// Per shred: verify the producer signature against the scheduled leader,
/// forward to our children immediately (before completeness), store, and
/// deliver the block once reconstruction succeeds. Buffers expire one slot
/// after first arrival.
pub async fn shred_receive_task(ctx: ReceiveContext, mut shred_rx: mpsc::Receiver<Shred>) {
    let clock = ctx.scheduler.clock();
    while let Some(shred) = shred_rx.recv().await {
        let (current_slot, _) = clock.slot_at(now_ns());
        ctx.buffers.expire(current_slot);

        let Some(producer) = verify_producer(&ctx, &shred, current_slot) else {
            warn!(
                index = shred.index,
                hash = %shred.block_hash,
                "dropping shred with unverifiable producer signature"
            );
            continue;
        };
        ctx.scheduler.registry().note_seen(&producer, now_ns());

        // forward first; children should not wait for our reconstruction
        let tree = TurbineTree::new(
            ctx.scheduler.registry().stake_ordered(),
            &producer,
            ctx.params.turbine_fanout,
        );
        for child in tree.children_of(&ctx.local_key) {
            ctx.sink.send_shred(child.address, &shred).await;
        }

        match ctx.buffers.insert(shred, current_slot) {
            InsertOutcome::Completed(block) => {
                if ctx.block_tx.send(*block).await.is_err() {
                    error!("block channel closed, stopping shred task");
                    return;
                }
            }
            InsertOutcome::Stored => {}
            InsertOutcome::Duplicate | InsertOutcome::AlreadyComplete => {
                trace!("redundant shred ignored");
            }
        }
    }
}

/// A shred must be signed by the leader of a slot near the current one;
/// the wire format carries no slot, so the producer is resolved through
/// the schedule for the current and previous slot.
fn verify_producer(ctx: &ReceiveContext, shred: &Shred, current_slot: u64) -> Option<PublicKey> {
    let candidates = [current_slot, current_slot.saturating_sub(1)];
    for slot in candidates {
        if let Ok(leader) = ctx.scheduler.leader_at(slot) {
            if shred.verify_signature(&leader).is_ok() {
                return Some(leader);
            }
        }
    }
    None
}
