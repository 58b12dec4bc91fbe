use std::{collections::HashMap, sync::Arc};

use anneal_chain_types::Vote;
use anneal_params::Params;
use anneal_primitives::{Hash32, PublicKey};
use anneal_scheduler::ValidatorRegistry;
use parking_lot::Mutex;
use tracing::trace;

/// Finalization quorum for `healthy` voting validators:
/// `ceil(2H/3) + 1` admissible YES votes, each healthy validator counting
/// equally. Exactly `ceil(2H/3)` votes do not finalize.
pub fn quorum_threshold(healthy: usize) -> usize {
    (2 * healthy).div_ceil(3) + 1
}

/// Outcome of the vote admission endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Counted. Carries the number of distinct admissible votes now held
    /// for the (slot, block hash).
    Admitted { votes: usize },
    /// Slot already finalized past, or blacklisted.
    Stale,
    /// Signer fails the healthy-for-voting predicate right now.
    UnhealthyVoter,
    BadSignature,
}

/// Collects one admissible vote per validator per (slot, block hash);
/// a later vote from the same validator replaces the earlier one, and
/// re-delivery never changes the count.
pub struct VoteAggregator {
    params: Arc<Params>,
    registry: Arc<ValidatorRegistry>,
    votes: Mutex<HashMap<(u64, Hash32), HashMap<PublicKey, Vote>>>,
}

impl std::fmt::Debug for VoteAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VoteAggregator(slots={})", self.votes.lock().len())
    }
}

impl VoteAggregator {
    pub fn new(params: Arc<Params>, registry: Arc<ValidatorRegistry>) -> Self {
        Self {
            params,
            registry,
            votes: Mutex::new(HashMap::new()),
        }
    }

    /// The vote admission endpoint. `finalized_slot` is the slot of the
    /// current finalized head; anything at or below it is stale.
    pub fn admit(&self, vote: Vote, now_ns: u64, finalized_slot: u64) -> VoteOutcome {
        if vote.verify_signature().is_err() {
            return VoteOutcome::BadSignature;
        }
        if vote.slot <= finalized_slot {
            return VoteOutcome::Stale;
        }
        if !self.registry.is_healthy(&vote.validator, now_ns, &self.params) {
            return VoteOutcome::UnhealthyVoter;
        }

        let mut votes = self.votes.lock();
        let entry = votes.entry((vote.slot, vote.block_hash)).or_default();
        entry.insert(vote.validator, vote);
        trace!(slot = vote.slot, hash = %vote.block_hash, votes = entry.len(), "vote admitted");
        VoteOutcome::Admitted { votes: entry.len() }
    }

    /// Admissible votes whose computed state root matches `state_root`.
    /// Votes carrying a different root are divergence signals, not YES
    /// votes for this block.
    pub fn matching_votes(&self, slot: u64, hash: Hash32, state_root: Hash32) -> Vec<Vote> {
        self.votes
            .lock()
            .get(&(slot, hash))
            .map(|entry| {
                entry
                    .values()
                    .filter(|vote| vote.state_root == state_root)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the matching YES votes reach quorum for the current healthy
    /// set.
    pub fn reached_quorum(
        &self,
        slot: u64,
        hash: Hash32,
        state_root: Hash32,
        now_ns: u64,
    ) -> bool {
        let healthy = self.registry.healthy_count(now_ns, &self.params);
        let have = self.matching_votes(slot, hash, state_root).len();
        have >= quorum_threshold(healthy)
    }

    /// Drop vote sets for slots at or below `cutoff`.
    pub fn prune_below(&self, cutoff: u64) {
        self.votes.lock().retain(|(slot, _), _| *slot > cutoff);
    }
}
