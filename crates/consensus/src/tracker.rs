use std::collections::HashMap;

use anneal_primitives::Hash32;
use parking_lot::Mutex;

/// Per-block lifecycle at this node. Transitions only move forward; once
/// `Rejected`, the (slot, hash) is blacklisted for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockPhase {
    Received,
    Verified,
    Voted,
    Finalized,
    Rejected,
}

impl BlockPhase {
    /// `Rejected` is terminal from any state; otherwise phases advance in
    /// declaration order.
    fn can_advance_to(self, next: BlockPhase) -> bool {
        match (self, next) {
            (BlockPhase::Finalized, _) | (BlockPhase::Rejected, _) => false,
            (_, BlockPhase::Rejected) => true,
            (cur, next) => next > cur,
        }
    }
}

/// Tracks every block hash seen this session, keyed by (slot, hash).
#[derive(Debug, Default)]
pub struct BlockTracker {
    inner: Mutex<HashMap<(u64, Hash32), BlockPhase>>,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly received block. Returns `false` when the hash is
    /// already known (including blacklisted ones), meaning the caller
    /// should not reprocess it.
    pub fn observe(&self, slot: u64, hash: Hash32) -> bool {
        let mut inner = self.inner.lock();
        match inner.get(&(slot, hash)) {
            Some(_) => false,
            None => {
                inner.insert((slot, hash), BlockPhase::Received);
                true
            }
        }
    }

    /// Move a block forward. Non-monotone transitions are ignored and
    /// reported as `false`.
    pub fn advance(&self, slot: u64, hash: Hash32, next: BlockPhase) -> bool {
        let mut inner = self.inner.lock();
        match inner.get_mut(&(slot, hash)) {
            Some(phase) if phase.can_advance_to(next) => {
                *phase = next;
                true
            }
            _ => false,
        }
    }

    pub fn phase(&self, slot: u64, hash: Hash32) -> Option<BlockPhase> {
        self.inner.lock().get(&(slot, hash)).copied()
    }

    pub fn is_rejected(&self, slot: u64, hash: Hash32) -> bool {
        self.phase(slot, hash) == Some(BlockPhase::Rejected)
    }

    /// Drop entries for slots at or below `cutoff`, except blacklist
    /// entries for the cutoff slot itself, which stay until the window
    /// moves past them.
    pub fn prune_below(&self, cutoff: u64) {
        self.inner.lock().retain(|(slot, _), _| *slot >= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(b: u8) -> Hash32 {
        Hash32::new([b; 32])
    }

    #[test]
    fn happy_path_is_monotone() {
        let tracker = BlockTracker::new();
        assert!(tracker.observe(1, hash(1)));
        assert!(tracker.advance(1, hash(1), BlockPhase::Verified));
        assert!(tracker.advance(1, hash(1), BlockPhase::Voted));
        assert!(tracker.advance(1, hash(1), BlockPhase::Finalized));
        // finalized is terminal
        assert!(!tracker.advance(1, hash(1), BlockPhase::Rejected));
    }

    #[test]
    fn rejection_is_terminal() {
        let tracker = BlockTracker::new();
        tracker.observe(1, hash(1));
        assert!(tracker.advance(1, hash(1), BlockPhase::Rejected));
        assert!(!tracker.advance(1, hash(1), BlockPhase::Verified));
        assert!(tracker.is_rejected(1, hash(1)));
        // re-observing a blacklisted hash is refused
        assert!(!tracker.observe(1, hash(1)));
    }

    #[test]
    fn cannot_move_backward() {
        let tracker = BlockTracker::new();
        tracker.observe(1, hash(1));
        tracker.advance(1, hash(1), BlockPhase::Voted);
        assert!(!tracker.advance(1, hash(1), BlockPhase::Verified));
    }

    #[test]
    fn prune_drops_old_slots() {
        let tracker = BlockTracker::new();
        tracker.observe(1, hash(1));
        tracker.observe(5, hash(2));
        tracker.prune_below(3);
        assert!(tracker.phase(1, hash(1)).is_none());
        assert!(tracker.phase(5, hash(2)).is_some());
    }
}
