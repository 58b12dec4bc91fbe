use std::collections::HashMap;

use anneal_chain_types::{Block, Shred};
use anneal_primitives::Hash32;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::shredder::{reassemble_block, TurbineError};

/// Result of offering a shred to the buffers.
#[derive(Debug)]
pub enum InsertOutcome {
    /// Stored; not enough shreds yet.
    Stored,
    /// Same index already present; delivering a shred twice changes
    /// nothing.
    Duplicate,
    /// This shred completed the block.
    Completed(Box<Block>),
    /// The block was already reconstructed earlier.
    AlreadyComplete,
}

struct BlockBuffer {
    shreds: HashMap<u32, Shred>,
    total_data: u32,
    /// Slot at which the first shred arrived; drives the TTL.
    arrival_slot: u64,
    completed: bool,
}

/// Per-block-hash shred collection, shared between receive tasks.
///
/// Buffers live for one slot past their arrival slot; a block that cannot
/// be reconstructed by then is dropped and the node moves on with its
/// current parent.
#[derive(Default)]
pub struct ReassemblyBuffers {
    inner: Mutex<HashMap<Hash32, BlockBuffer>>,
}

impl std::fmt::Debug for ReassemblyBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReassemblyBuffers(blocks={})", self.inner.lock().len())
    }
}

impl ReassemblyBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a verified shred and attempt reconstruction once enough
    /// distinct shreds are present.
    pub fn insert(&self, shred: Shred, current_slot: u64) -> InsertOutcome {
        let mut inner = self.inner.lock();
        let buffer = inner.entry(shred.block_hash).or_insert_with(|| BlockBuffer {
            shreds: HashMap::new(),
            total_data: shred.total_data,
            arrival_slot: current_slot,
            completed: false,
        });

        if buffer.completed {
            return InsertOutcome::AlreadyComplete;
        }
        if buffer.shreds.contains_key(&shred.index) {
            return InsertOutcome::Duplicate;
        }
        buffer.shreds.insert(shred.index, shred);

        if (buffer.shreds.len() as u32) < buffer.total_data {
            return InsertOutcome::Stored;
        }

        let refs: Vec<&Shred> = buffer.shreds.values().collect();
        match reassemble_block(&refs) {
            Ok(block) => {
                buffer.completed = true;
                // shreds are ephemeral once the block exists
                buffer.shreds.clear();
                debug!(hash = %block.hash(), "block reconstructed from shreds");
                InsertOutcome::Completed(Box::new(block))
            }
            Err(TurbineError::NotEnoughShreds { .. }) => InsertOutcome::Stored,
            Err(err) => {
                warn!(?err, "block reconstruction failed");
                InsertOutcome::Stored
            }
        }
    }

    /// Drop buffers whose TTL of one slot has passed.
    pub fn expire(&self, current_slot: u64) {
        self.inner.lock().retain(|hash, buffer| {
            let keep = buffer.completed || current_slot <= buffer.arrival_slot + 1;
            if !keep {
                warn!(%hash, shreds = buffer.shreds.len(), "reassembly buffer expired");
            }
            keep
        });
    }

    /// Number of blocks currently buffering.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
