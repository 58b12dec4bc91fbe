use std::collections::HashMap;

use anneal_chain_types::{Block, Vote};
use anneal_primitives::Hash32;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// A block together with the vote set that finalized it.
#[derive(Debug, Clone)]
pub struct FinalizedBlock {
    pub block: Block,
    pub votes: Vec<Vote>,
}

/// Snapshot of the finalized chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadInfo {
    pub height: u64,
    pub hash: Hash32,
    pub slot: u64,
}

/// Append violations. These indicate a logic error in the caller; the
/// chain itself never rolls back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("height {got} does not extend head height {head}")]
    HeightMismatch { head: u64, got: u64 },
    #[error("parent hash {got} does not match head {head}")]
    ParentMismatch { head: Hash32, got: Hash32 },
    #[error("block {0} already finalized")]
    DuplicateBlock(Hash32),
    #[error("slot {got} not after head slot {head}")]
    SlotNotAdvancing { head: u64, got: u64 },
}

struct ChainInner {
    blocks: Vec<FinalizedBlock>,
    by_hash: HashMap<Hash32, usize>,
}

/// The append-only finalized chain.
///
/// The single writer is the finalization step; readers take cheap
/// snapshots of the head pointer and never block it. Every append is
/// published on the head watch channel, which is the finalized-head
/// subscription surface (skipped slots show up as slot-number gaps).
pub struct ChainStore {
    inner: RwLock<ChainInner>,
    head_tx: watch::Sender<HeadInfo>,
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head = self.head();
        write!(f, "ChainStore(head={}@{})", head.height, head.hash)
    }
}

impl ChainStore {
    /// Start a chain from its genesis block.
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let head = HeadInfo {
            height: genesis.height,
            hash,
            slot: genesis.slot,
        };
        let mut by_hash = HashMap::new();
        by_hash.insert(hash, 0);
        let (head_tx, _) = watch::channel(head);
        Self {
            inner: RwLock::new(ChainInner {
                blocks: vec![FinalizedBlock {
                    block: genesis,
                    votes: Vec::new(),
                }],
                by_hash,
            }),
            head_tx,
        }
    }

    /// Current head snapshot.
    pub fn head(&self) -> HeadInfo {
        *self.head_tx.borrow()
    }

    /// Subscribe to finalized-head updates, delivered in order.
    pub fn subscribe(&self) -> watch::Receiver<HeadInfo> {
        self.head_tx.subscribe()
    }

    /// Append a finalized block. Checks the chain invariants but not block
    /// validity; callers finalize only verified blocks.
    pub fn append(&self, block: Block, votes: Vec<Vote>) -> Result<HeadInfo, LedgerError> {
        let mut inner = self.inner.write();
        let head = self.head();

        if block.height != head.height + 1 {
            return Err(LedgerError::HeightMismatch {
                head: head.height,
                got: block.height,
            });
        }
        if block.parent_hash != head.hash {
            return Err(LedgerError::ParentMismatch {
                head: head.hash,
                got: block.parent_hash,
            });
        }
        if block.slot <= head.slot {
            return Err(LedgerError::SlotNotAdvancing {
                head: head.slot,
                got: block.slot,
            });
        }
        let hash = block.hash();
        if inner.by_hash.contains_key(&hash) {
            return Err(LedgerError::DuplicateBlock(hash));
        }

        let new_head = HeadInfo {
            height: block.height,
            hash,
            slot: block.slot,
        };
        let idx = inner.blocks.len();
        inner.by_hash.insert(hash, idx);
        inner.blocks.push(FinalizedBlock { block, votes });
        drop(inner);

        info!(height = new_head.height, hash = %new_head.hash, slot = new_head.slot, "finalized block appended");
        // Receivers may be gone; appends still succeed.
        let _ = self.head_tx.send(new_head);
        Ok(new_head)
    }

    pub fn get_by_hash(&self, hash: &Hash32) -> Option<FinalizedBlock> {
        let inner = self.inner.read();
        inner.by_hash.get(hash).map(|&i| inner.blocks[i].clone())
    }

    pub fn get_by_height(&self, height: u64) -> Option<FinalizedBlock> {
        let inner = self.inner.read();
        inner.blocks.get(height as usize).cloned()
    }

    /// Slot of the block with this hash, if finalized.
    pub fn slot_of(&self, hash: &Hash32) -> Option<u64> {
        let inner = self.inner.read();
        inner.by_hash.get(hash).map(|&i| inner.blocks[i].block.slot)
    }

    /// Whether `hash` names a finalized block within the recent-blockhash
    /// window ending at `current_slot`: exactly `window` slots old is still
    /// admissible, one more is not.
    pub fn blockhash_is_recent(&self, hash: &Hash32, current_slot: u64, window: u64) -> bool {
        match self.slot_of(hash) {
            Some(slot) => current_slot.saturating_sub(slot) <= window,
            None => false,
        }
    }

    pub fn height(&self) -> u64 {
        self.head().height
    }
}
