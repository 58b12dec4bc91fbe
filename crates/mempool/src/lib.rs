//! The pending-transaction pool between ingress and the block builder.
//!
//! Writers are the submission surface, the single reader is the leader's
//! build loop; both sides go through one lock-guarded queue. Transactions
//! drain oldest-first and expire after the blockhash window elapses.
//! Duplicate ids are filtered for the full window even after inclusion.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use anneal_chain_types::Transaction;
use anneal_ledger::LedgerState;
use anneal_params::Params;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Outcome of the transaction submission surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Why a submitted transaction was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadSignature,
    /// Same id seen within the blockhash window, including ids already
    /// finalized.
    DuplicateId,
    /// The referenced recent blockhash does not resolve inside the window.
    StaleBlockhash,
}

struct Pending {
    tx: Transaction,
    /// Slot at submission; drives TTL eviction.
    enqueued_slot: u64,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Pending>,
    /// id -> slot last seen; pruned as the window slides.
    seen_ids: HashMap<u128, u64>,
}

/// Shared mempool handle.
pub struct Mempool {
    params: Arc<Params>,
    ledger: Arc<LedgerState>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Mempool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mempool(len={})", self.len())
    }
}

impl Mempool {
    pub fn new(params: Arc<Params>, ledger: Arc<LedgerState>) -> Self {
        Self {
            params,
            ledger,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// The transaction submission surface.
    ///
    /// Admission here covers signature validity, the duplicate-id window,
    /// and blockhash recency. Balance feasibility is checked by the leader
    /// at build time against the executed state.
    pub fn submit(&self, tx: Transaction, current_slot: u64) -> SubmitOutcome {
        if tx.verify_signature().is_err() {
            return SubmitOutcome::Rejected(RejectReason::BadSignature);
        }
        if !self.ledger.chain().blockhash_is_recent(
            &tx.recent_blockhash,
            current_slot,
            self.params.blockhash_window_slots,
        ) {
            return SubmitOutcome::Rejected(RejectReason::StaleBlockhash);
        }

        let mut inner = self.inner.lock();
        self.prune_seen(&mut inner, current_slot);
        if inner.seen_ids.contains_key(&tx.id) {
            return SubmitOutcome::Rejected(RejectReason::DuplicateId);
        }

        trace!(id = tx.id, slot = current_slot, "transaction accepted");
        inner.seen_ids.insert(tx.id, current_slot);
        inner.queue.push_back(Pending {
            tx,
            enqueued_slot: current_slot,
        });
        SubmitOutcome::Accepted
    }

    /// Drain up to `max` pending transactions oldest-first, dropping any
    /// that expired. `max = None` drains everything pending.
    pub fn drain(&self, current_slot: u64, max: Option<usize>) -> Vec<Transaction> {
        let mut inner = self.inner.lock();
        let limit = max.unwrap_or(usize::MAX);
        let mut out = Vec::new();

        while out.len() < limit {
            let Some(pending) = inner.queue.pop_front() else {
                break;
            };
            if self.expired(pending.enqueued_slot, current_slot) {
                debug!(id = pending.tx.id, "pending transaction expired");
                continue;
            }
            out.push(pending.tx);
        }
        out
    }

    /// Drop expired entries without draining. Called on slot ticks.
    pub fn evict_expired(&self, current_slot: u64) {
        let mut inner = self.inner.lock();
        while let Some(front) = inner.queue.front() {
            if self.expired(front.enqueued_slot, current_slot) {
                let dropped = inner.queue.pop_front().expect("front exists");
                debug!(id = dropped.tx.id, "pending transaction expired");
            } else {
                break;
            }
        }
        self.prune_seen(&mut inner, current_slot);
    }

    fn expired(&self, enqueued_slot: u64, current_slot: u64) -> bool {
        current_slot.saturating_sub(enqueued_slot) > self.params.blockhash_window_slots
    }

    fn prune_seen(&self, inner: &mut Inner, current_slot: u64) {
        let window = self.params.blockhash_window_slots;
        inner
            .seen_ids
            .retain(|_, seen_slot| current_slot.saturating_sub(*seen_slot) <= window);
    }
}

#[cfg(test)]
mod tests {
    use anneal_chain_types::TxKind;
    use anneal_ledger::GenesisConfig;
    use anneal_primitives::{Hash32, Keypair};

    use super::*;

    fn setup() -> (Arc<LedgerState>, Mempool, Keypair, Hash32) {
        let kp = Keypair::generate();
        let genesis = GenesisConfig::new(vec![(kp.public_key(), 1_000)], 0, Hash32::ZERO);
        let ledger = LedgerState::from_genesis(&genesis);
        let genesis_hash = ledger.head().hash;
        let mempool = Mempool::new(Arc::new(Params::default()), ledger.clone());
        (ledger, mempool, kp, genesis_hash)
    }

    fn tx(kp: &Keypair, id: u128, blockhash: Hash32) -> Transaction {
        Transaction::new_signed(
            kp,
            Keypair::generate().public_key(),
            5,
            TxKind::Transfer,
            id,
            0,
            blockhash,
        )
    }

    #[test]
    fn accepts_then_rejects_duplicate() {
        let (_ledger, mempool, kp, blockhash) = setup();
        let t = tx(&kp, 1, blockhash);
        assert_eq!(mempool.submit(t.clone(), 0), SubmitOutcome::Accepted);
        assert_eq!(
            mempool.submit(t, 0),
            SubmitOutcome::Rejected(RejectReason::DuplicateId)
        );
    }

    #[test]
    fn duplicate_rejected_even_after_drain() {
        let (_ledger, mempool, kp, blockhash) = setup();
        let t = tx(&kp, 1, blockhash);
        mempool.submit(t.clone(), 0);
        let drained = mempool.drain(0, None);
        assert_eq!(drained.len(), 1);
        // the id stays in the window even though the queue is empty
        assert_eq!(
            mempool.submit(t, 10),
            SubmitOutcome::Rejected(RejectReason::DuplicateId)
        );
    }

    #[test]
    fn unknown_blockhash_rejected() {
        let (_ledger, mempool, kp, _blockhash) = setup();
        let t = tx(&kp, 1, Hash32::new([9; 32]));
        assert_eq!(
            mempool.submit(t, 0),
            SubmitOutcome::Rejected(RejectReason::StaleBlockhash)
        );
    }

    #[test]
    fn bad_signature_rejected() {
        let (_ledger, mempool, kp, blockhash) = setup();
        let mut t = tx(&kp, 1, blockhash);
        t.amount += 1;
        assert_eq!(
            mempool.submit(t, 0),
            SubmitOutcome::Rejected(RejectReason::BadSignature)
        );
    }

    #[test]
    fn drains_oldest_first() {
        let (_ledger, mempool, kp, blockhash) = setup();
        for id in 0..5 {
            mempool.submit(tx(&kp, id, blockhash), 0);
        }
        let drained = mempool.drain(0, Some(3));
        let ids: Vec<_> = drained.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(mempool.len(), 2);
    }

    #[test]
    fn expired_transactions_are_dropped_on_drain() {
        let (_ledger, mempool, kp, blockhash) = setup();
        mempool.submit(tx(&kp, 1, blockhash), 0);
        let window = Params::default().blockhash_window_slots;
        // still alive exactly at the window edge
        assert_eq!(mempool.drain(window, None).len(), 1);

        mempool.submit(tx(&kp, 2, blockhash), 0);
        assert!(mempool.drain(window + 1, None).is_empty());
    }

    #[test]
    fn duplicate_window_boundary() {
        let (_ledger, mempool, kp, blockhash) = setup();
        let window = Params::default().blockhash_window_slots;
        mempool.submit(tx(&kp, 1, blockhash), 0);
        // exactly `window` slots later the id is still inside the window
        assert_eq!(
            mempool.submit(tx(&kp, 1, blockhash), window),
            SubmitOutcome::Rejected(RejectReason::DuplicateId)
        );
    }
}
