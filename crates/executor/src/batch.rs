use std::collections::HashSet;

use anneal_chain_types::Transaction;
use anneal_primitives::PublicKey;

/// Accounts a transaction reads and writes.
///
/// Every touched account is in the write set here: the sender record is
/// written for the nonce bump, and both ends of the effective transfer are
/// written for the balance change. The read set never exceeds the write
/// set, so two transactions conflict exactly when their write sets
/// intersect.
fn write_set(tx: &Transaction) -> HashSet<PublicKey> {
    let (debit, credit) = tx.effective_transfer();
    HashSet::from([tx.sender, debit, credit])
}

/// Plan transactions into parallel batches.
///
/// Walks the input in order and greedily assigns each transaction to the
/// lowest-indexed batch it does not conflict with. Within a batch all
/// write sets are disjoint; batches execute sequentially, which preserves
/// input-order semantics.
///
/// Returns batches of indices into the input slice.
pub fn plan_batches(txs: &[Transaction]) -> Vec<Vec<usize>> {
    let mut batches: Vec<Vec<usize>> = Vec::new();
    let mut batch_writes: Vec<HashSet<PublicKey>> = Vec::new();

    for (idx, tx) in txs.iter().enumerate() {
        let writes = write_set(tx);
        let slot = batch_writes
            .iter()
            .position(|existing| existing.is_disjoint(&writes));
        match slot {
            Some(i) => {
                batches[i].push(idx);
                batch_writes[i].extend(writes);
            }
            None => {
                batches.push(vec![idx]);
                batch_writes.push(writes);
            }
        }
    }

    batches
}

#[cfg(test)]
mod tests {
    use anneal_chain_types::TxKind;
    use anneal_primitives::{Hash32, Keypair};

    use super::*;

    fn tx(from: &Keypair, to: PublicKey, kind: TxKind, id: u128) -> Transaction {
        Transaction::new_signed(from, to, 1, kind, id, 0, Hash32::ZERO)
    }

    #[test]
    fn independent_transfers_share_a_batch() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let (c, d) = (
            Keypair::generate().public_key(),
            Keypair::generate().public_key(),
        );
        let txs = vec![tx(&a, c, TxKind::Transfer, 0), tx(&b, d, TxKind::Transfer, 1)];
        assert_eq!(plan_batches(&txs), vec![vec![0, 1]]);
    }

    #[test]
    fn same_sender_serializes() {
        let a = Keypair::generate();
        let (c, d) = (
            Keypair::generate().public_key(),
            Keypair::generate().public_key(),
        );
        let txs = vec![tx(&a, c, TxKind::Transfer, 0), tx(&a, d, TxKind::Transfer, 1)];
        assert_eq!(plan_batches(&txs), vec![vec![0], vec![1]]);
    }

    #[test]
    fn shared_receiver_serializes() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let c = Keypair::generate().public_key();
        let txs = vec![tx(&a, c, TxKind::Transfer, 0), tx(&b, c, TxKind::Transfer, 1)];
        assert_eq!(plan_batches(&txs), vec![vec![0], vec![1]]);
    }

    #[test]
    fn stake_transactions_conflict_on_the_pool() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        // receiver field is ignored for stake; both route through the pool
        let r = Keypair::generate().public_key();
        let txs = vec![tx(&a, r, TxKind::Stake, 0), tx(&b, r, TxKind::Stake, 1)];
        assert_eq!(plan_batches(&txs), vec![vec![0], vec![1]]);
    }

    #[test]
    fn falls_back_to_earliest_open_batch() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let c = Keypair::generate();
        let sink = Keypair::generate().public_key();
        // tx0 and tx1 conflict (same sender); tx2 is independent and lands
        // in batch 0 even though batch 1 exists.
        let txs = vec![
            tx(&a, sink, TxKind::Transfer, 0),
            tx(&a, sink, TxKind::Transfer, 1),
            tx(&b, c.public_key(), TxKind::Transfer, 2),
        ];
        assert_eq!(plan_batches(&txs), vec![vec![0, 2], vec![1]]);
    }
}
