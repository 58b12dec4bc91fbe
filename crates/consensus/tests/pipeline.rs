//! End-to-end exercises of the production and finalization pipeline:
//! build, verify, vote, finalize, and the failure paths around them.

use std::{sync::Arc, time::Duration};

use anneal_block_assembly::{build_block, BlockAssemblyInputs};
use anneal_chain_types::{Block, PohEntry, Transaction, TxKind, ValidatorRecord, Vote};
use anneal_consensus::{
    build_consensus_task, quorum_threshold, verify_block, ConsensusContext, VerifyError, VoteSink,
};
use anneal_executor::Executor;
use anneal_ledger::{GenesisConfig, LedgerState};
use anneal_mempool::{Mempool, RejectReason, SubmitOutcome};
use anneal_params::Params;
use anneal_primitives::{sha256, Hash32, Keypair, PublicKey};
use anneal_scheduler::{now_ns, LeaderScheduler, SlotClock, ValidatorRegistry};
use anneal_turbine::{make_shreds, reassemble_block};
use async_trait::async_trait;
use parking_lot::Mutex;

/// A network of validators sharing one genesis, as seen from one node.
struct Cluster {
    params: Arc<Params>,
    validators: Vec<Keypair>,
    users: Vec<Keypair>,
    registry: Arc<ValidatorRegistry>,
    ledger: Arc<LedgerState>,
    scheduler: Arc<LeaderScheduler>,
    executor: Arc<Executor>,
}

fn cluster(validator_count: usize, user_balances: &[u64], genesis_ns: u64) -> Cluster {
    let params = Arc::new(Params {
        poh_min_hash_rate: 0,
        // generous grace so slow test machines never expire pending blocks
        quorum_grace: Duration::from_secs(2),
        ..Params::default()
    });

    let validators: Vec<_> = (0..validator_count).map(|_| Keypair::generate()).collect();
    let users: Vec<_> = user_balances.iter().map(|_| Keypair::generate()).collect();

    let registry = Arc::new(ValidatorRegistry::new());
    for (i, kp) in validators.iter().enumerate() {
        let mut rec = ValidatorRecord::new(
            kp.public_key(),
            100 + i as u64,
            format!("127.0.0.1:{}", 20_000 + i).parse().unwrap(),
        );
        rec.health.last_seen_ns = now_ns();
        registry.upsert(rec);
    }

    let accounts = users
        .iter()
        .zip(user_balances)
        .map(|(kp, balance)| (kp.public_key(), *balance))
        .collect();
    let genesis = GenesisConfig::new(accounts, genesis_ns, Hash32::new([42; 32]));
    let ledger = LedgerState::from_genesis(&genesis);

    let clock = SlotClock::new(genesis_ns, params.slot_duration);
    let scheduler = Arc::new(
        LeaderScheduler::new(
            params.clone(),
            genesis.epoch_seed,
            registry.clone(),
            clock,
            genesis_ns,
        )
        .unwrap(),
    );

    Cluster {
        params,
        validators,
        users,
        registry,
        ledger,
        scheduler,
        executor: Arc::new(Executor::new(4)),
    }
}

impl Cluster {
    /// The keypair that is scheduled to lead `slot`.
    fn leader_keypair(&self, slot: u64) -> &Keypair {
        let leader = self.scheduler.leader_at(slot).unwrap();
        self.validators
            .iter()
            .find(|kp| kp.public_key() == leader)
            .expect("leader is one of the cluster validators")
    }

    fn build(&self, slot: u64, candidates: Vec<Transaction>) -> Block {
        let leader = self.leader_keypair(slot);
        build_block(
            BlockAssemblyInputs {
                parent: self.ledger.head(),
                accounts: self.ledger.snapshot_accounts(),
                candidates,
                slot,
                timestamp_ns: slot * 400_000_000,
                params: &self.params,
            },
            &self.executor,
            &self.ledger,
            leader,
        )
        .unwrap()
        .block
    }

    fn transfer(&self, from: usize, to: PublicKey, amount: u64, id: u128) -> Transaction {
        Transaction::new_signed(
            &self.users[from],
            to,
            amount,
            TxKind::Transfer,
            id,
            0,
            self.ledger.head().hash,
        )
    }
}

/// Canonical account encoding, written out independently of the ledger
/// code: `(key, balance, nonce)` in ascending key order, SHA-256.
fn manual_state_root(mut accounts: Vec<(PublicKey, u64, u64)>) -> Hash32 {
    accounts.sort_by(|a, b| a.0.cmp(&b.0));
    let mut buf = Vec::new();
    for (key, balance, nonce) in accounts {
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&balance.to_le_bytes());
        buf.extend_from_slice(&nonce.to_le_bytes());
    }
    sha256(&buf)
}

#[test]
fn single_slot_three_transfers_finalize() {
    let cx = cluster(4, &[100, 0, 0], 0);
    let [a, b, c] = [
        cx.users[0].public_key(),
        cx.users[1].public_key(),
        cx.users[2].public_key(),
    ];

    let t1 = cx.transfer(0, b, 30, 1);
    let t2 = cx.transfer(0, c, 20, 2);
    let t3 = Transaction::new_signed(
        &cx.users[1],
        c,
        10,
        TxKind::Transfer,
        3,
        0,
        cx.ledger.head().hash,
    );
    let block = cx.build(1, vec![t1, t2, t3]);

    assert_eq!(block.height, 1);
    assert_eq!(block.transactions.len(), 3);
    // three ingests plus at least three trailing ticks
    assert!(block.poh.len() >= 6);

    // A=50 after two sends (nonce 2), B=20 after receive+send (nonce 1)
    let expected_root = manual_state_root(vec![(a, 50, 2), (b, 20, 1), (c, 10, 0)]);
    assert_eq!(block.state_root, expected_root);

    // every validator re-executes and votes
    let mut verified_roots = Vec::new();
    for _ in &cx.validators {
        let vb = verify_block(
            block.clone(),
            cx.ledger.head(),
            cx.ledger.snapshot_accounts(),
            &cx.scheduler,
            &cx.executor,
        )
        .unwrap();
        verified_roots.push(vb.state_root);
    }
    assert!(verified_roots.iter().all(|root| *root == expected_root));

    // quorum of equal-weight healthy votes finalizes
    let votes: Vec<Vote> = cx
        .validators
        .iter()
        .map(|kp| Vote::new_signed(kp, 1, block.hash(), expected_root))
        .collect();
    assert!(votes.len() >= quorum_threshold(cx.validators.len()));

    let vb = verify_block(
        block,
        cx.ledger.head(),
        cx.ledger.snapshot_accounts(),
        &cx.scheduler,
        &cx.executor,
    )
    .unwrap();
    cx.ledger
        .commit_block(vb.block, votes, vb.post_accounts)
        .unwrap();

    let head = cx.ledger.head();
    assert_eq!(head.height, 1);
    assert_eq!(cx.ledger.state_root(), expected_root);
    let stored = cx.ledger.get_by_hash(&head.hash).unwrap();
    assert_eq!(stored.votes.len(), 4);
}

#[test]
fn overdrawn_transaction_leaves_state_untouched() {
    let cx = cluster(4, &[5], 0);
    let a = cx.users[0].public_key();
    let t1 = cx.transfer(0, Keypair::generate().public_key(), 10, 1);

    let block = cx.build(1, vec![t1]);
    assert!(block.transactions.is_empty());
    assert!(block.poh.iter().all(PohEntry::is_tick));
    assert_eq!(block.state_root, manual_state_root(vec![(a, 5, 0)]));
}

#[test]
fn cheating_leader_is_rejected_by_every_validator() {
    let cx = cluster(4, &[100], 0);
    let t1 = cx.transfer(0, Keypair::generate().public_key(), 10, 1);

    let mut block = cx.build(1, vec![t1]);
    block.state_root = Hash32::new([0xde; 32]);
    block.sign(cx.leader_keypair(1));

    for _ in &cx.validators {
        let err = verify_block(
            block.clone(),
            cx.ledger.head(),
            cx.ledger.snapshot_accounts(),
            &cx.scheduler,
            &cx.executor,
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::StateRootMismatch { .. }));
    }
    // nobody voted; the head never moves for this slot
    assert_eq!(cx.ledger.head().height, 0);
}

#[test]
fn wrong_producer_is_rejected() {
    let cx = cluster(4, &[100], 0);
    let slot = 1;
    // find a validator who is NOT the slot leader and have them forge
    let leader = cx.scheduler.leader_at(slot).unwrap();
    let imposter = cx
        .validators
        .iter()
        .find(|kp| kp.public_key() != leader)
        .unwrap();

    let mut block = cx.build(slot, vec![]);
    block.producer = imposter.public_key();
    block.sign(imposter);

    let err = verify_block(
        block,
        cx.ledger.head(),
        cx.ledger.snapshot_accounts(),
        &cx.scheduler,
        &cx.executor,
    )
    .unwrap_err();
    assert!(matches!(err, VerifyError::WrongProducer { .. }));
}

#[test]
fn tampered_poh_order_is_rejected() {
    let cx = cluster(4, &[100], 0);
    let t1 = cx.transfer(0, Keypair::generate().public_key(), 10, 1);
    let t2 = cx.transfer(0, Keypair::generate().public_key(), 5, 2);

    let mut block = cx.build(1, vec![t1, t2]);
    // reorder transactions without re-recording poh
    block.transactions.swap(0, 1);
    block.sign(cx.leader_keypair(1));

    let err = verify_block(
        block,
        cx.ledger.head(),
        cx.ledger.snapshot_accounts(),
        &cx.scheduler,
        &cx.executor,
    )
    .unwrap_err();
    assert!(matches!(err, VerifyError::TxOrderMismatch));
}

#[test]
fn twenty_data_shred_block_survives_seven_losses() {
    let cx = cluster(4, &[100], 0);
    let leader = cx.leader_keypair(1);

    // pad the poh chain until the serialized block needs exactly 20 data
    // shreds
    let mut block = cx.build(1, vec![]);
    loop {
        let shreds = make_shreds(&block, leader, &cx.params).unwrap();
        match shreds[0].total_data.cmp(&20) {
            std::cmp::Ordering::Less => {
                block.poh.push(PohEntry {
                    hash: Hash32::ZERO,
                    digest: None,
                });
            }
            std::cmp::Ordering::Equal => break,
            std::cmp::Ordering::Greater => panic!("overshot 20 data shreds"),
        }
    }
    let shreds = make_shreds(&block, leader, &cx.params).unwrap();
    assert_eq!(shreds[0].total_data, 20);
    assert_eq!(shreds[0].total_recovery, 7);

    // drop seven shreds under several spreads, including a hash-derived
    // pseudo-random one
    let total = shreds.len();
    let mut drop_patterns: Vec<Vec<usize>> = vec![
        (0..7).collect(),
        (total - 7..total).collect(),
        (0..total).step_by(4).take(7).collect(),
    ];
    let mut picked = Vec::new();
    let mut cursor = 0u32;
    while picked.len() < 7 {
        let digest = sha256(&cursor.to_le_bytes());
        let idx = (u64::from_le_bytes(digest.as_bytes()[..8].try_into().unwrap())
            % total as u64) as usize;
        if !picked.contains(&idx) {
            picked.push(idx);
        }
        cursor += 1;
    }
    drop_patterns.push(picked);

    for pattern in drop_patterns {
        let kept: Vec<_> = shreds
            .iter()
            .enumerate()
            .filter(|(i, _)| !pattern.contains(i))
            .map(|(_, s)| s)
            .collect();
        let rebuilt = reassemble_block(&kept).unwrap();
        assert_eq!(rebuilt, block);
    }
}

#[test]
fn finalized_transaction_cannot_be_resubmitted() {
    let cx = cluster(4, &[100], 0);
    let mempool = Mempool::new(cx.params.clone(), cx.ledger.clone());

    let t1 = cx.transfer(0, Keypair::generate().public_key(), 10, 77);
    assert_eq!(mempool.submit(t1.clone(), 0), SubmitOutcome::Accepted);
    let candidates = mempool.drain(1, None);

    let block = cx.build(1, candidates);
    let vb = verify_block(
        block,
        cx.ledger.head(),
        cx.ledger.snapshot_accounts(),
        &cx.scheduler,
        &cx.executor,
    )
    .unwrap();
    let votes = cx
        .validators
        .iter()
        .map(|kp| Vote::new_signed(kp, 1, vb.block.hash(), vb.state_root))
        .collect();
    cx.ledger
        .commit_block(vb.block, votes, vb.post_accounts)
        .unwrap();

    // the same id bounces for the rest of the window
    assert_eq!(
        mempool.submit(t1, 5),
        SubmitOutcome::Rejected(RejectReason::DuplicateId)
    );
}

/// Captures votes broadcast by the node under test.
#[derive(Default)]
struct RecordingVoteSink {
    votes: Mutex<Vec<Vote>>,
}

#[async_trait]
impl VoteSink for RecordingVoteSink {
    async fn broadcast_vote(&self, vote: &Vote) {
        self.votes.lock().push(*vote);
    }
}

async fn await_head_change(
    head_rx: &mut tokio::sync::watch::Receiver<anneal_ledger::HeadInfo>,
) -> anneal_ledger::HeadInfo {
    tokio::time::timeout(Duration::from_secs(5), head_rx.changed())
        .await
        .expect("head should advance")
        .unwrap();
    *head_rx.borrow_and_update()
}

#[tokio::test]
async fn full_pipeline_finalizes_on_quorum_and_skips_without_it() {
    // genesis "now" so housekeeping sees early slots as current
    let cx = cluster(4, &[100], now_ns());
    let sink = Arc::new(RecordingVoteSink::default());
    let local = cx.leader_keypair(1).clone();

    let (handle, task) = build_consensus_task(ConsensusContext {
        params: cx.params.clone(),
        keypair: Arc::new(local.clone()),
        scheduler: cx.scheduler.clone(),
        ledger: cx.ledger.clone(),
        executor: cx.executor.clone(),
        vote_sink: sink.clone(),
    });
    tokio::spawn(task);
    let mut head_rx = cx.ledger.subscribe();

    // --- slot 1: only 3 of 4 healthy validators vote; H=4 needs 4 ---
    let block1 = cx.build(1, vec![cx.transfer(0, Keypair::generate().public_key(), 10, 1)]);
    let hash1 = block1.hash();
    handle.deliver_block(block1).await.unwrap();

    // wait for the node's own vote (1 of 3)
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !sink.votes.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let own_vote = sink.votes.lock()[0];
    assert_eq!(own_vote.block_hash, hash1);

    // two more validators vote; total 3 < quorum_threshold(4) = 4
    for kp in cx
        .validators
        .iter()
        .filter(|kp| kp.public_key() != local.public_key())
        .take(2)
    {
        let vote = Vote::new_signed(kp, 1, hash1, own_vote.state_root);
        assert!(matches!(
            handle.submit_vote(vote).await,
            anneal_consensus::VoteOutcome::Admitted { .. }
        ));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cx.ledger.head().height, 0, "three votes must not finalize");

    // --- slot 2: the next leader builds on the unchanged parent ---
    sink.votes.lock().clear();
    let block2 = cx.build(2, vec![]);
    assert_eq!(block2.parent_hash, cx.ledger.head().hash);
    let hash2 = block2.hash();
    handle.deliver_block(block2).await.unwrap();

    // this time every other validator votes as well
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !sink.votes.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let root2 = sink.votes.lock()[0].state_root;
    for kp in cx
        .validators
        .iter()
        .filter(|kp| kp.public_key() != local.public_key())
    {
        handle.submit_vote(Vote::new_signed(kp, 2, hash2, root2)).await;
    }

    let head = await_head_change(&mut head_rx).await;
    assert_eq!(head.height, 1);
    // slot 1 was skipped: the finalized head jumps straight to slot 2
    assert_eq!(head.slot, 2);
    assert_eq!(head.hash, hash2);
}

#[tokio::test]
async fn unhealthy_voter_is_turned_away_at_the_endpoint() {
    let cx = cluster(4, &[100], now_ns());
    let sink = Arc::new(RecordingVoteSink::default());
    let local = cx.leader_keypair(1).clone();

    let (handle, task) = build_consensus_task(ConsensusContext {
        params: cx.params.clone(),
        keypair: Arc::new(local),
        scheduler: cx.scheduler.clone(),
        ledger: cx.ledger.clone(),
        executor: cx.executor.clone(),
        vote_sink: sink,
    });
    tokio::spawn(task);

    // degrade one validator below the uptime floor
    let sick = cx.validators[3].public_key();
    cx.registry.note_metrics(&sick, 400_000, 0);

    let vote = Vote::new_signed(&cx.validators[3], 1, Hash32::new([1; 32]), Hash32::ZERO);
    assert_eq!(
        handle.submit_vote(vote).await,
        anneal_consensus::VoteOutcome::UnhealthyVoter
    );
}
