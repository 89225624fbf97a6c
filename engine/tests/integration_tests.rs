//! End-to-end pipeline tests: blocks in, commitments out.

use std::sync::{Arc, Mutex};
use strata_consensus::Committee;
use strata_engine::{Engine, EngineConfig, EngineEvent, HealthStatus};
use strata_store::MemoryStore;
use strata_types::{
    AccountId, Block, BlockId, Commitment, CommitmentId, Output, OutputBody, OutputId,
    Payload, SlotIndex, Timestamp, Transaction, TransactionId,
};

fn account(byte: u8) -> AccountId {
    AccountId::new([byte; 32])
}

/// Committee of three equal seats with a two-thirds (66%) threshold, so two
/// seats accept.
fn committee() -> Arc<Committee> {
    Arc::new(Committee::new(
        vec![(account(1), 1), (account(2), 1), (account(3), 1)],
        6600,
        6600,
    ))
}

struct Recorder {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl Recorder {
    fn attach(engine: &Engine) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine.events().subscribe(Box::new(move |event| {
            sink.lock().unwrap().push(event.clone());
        }));
        Self { events }
    }

    fn committed_slots(&self) -> Vec<u64> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::SlotCommitted { commitment } => Some(commitment.slot.as_u64()),
                _ => None,
            })
            .collect()
    }

    fn contains(&self, predicate: impl Fn(&EngineEvent) -> bool) -> bool {
        self.events.lock().unwrap().iter().any(predicate)
    }
}

fn genesis_output_id() -> OutputId {
    OutputId::new(TransactionId::ZERO, 0)
}

fn test_engine() -> Arc<Engine> {
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(MemoryStore::new()),
        committee(),
    )
    .unwrap();
    engine
        .add_genesis_output(&Output {
            output_id: genesis_output_id(),
            block_id_booked_in: BlockId::ZERO,
            slot_booked: SlotIndex::GENESIS,
            slot_created: SlotIndex::GENESIS,
            body: OutputBody::basic(1000),
        })
        .unwrap();
    engine
}

fn make_tx(byte: u8, inputs: Vec<OutputId>, outputs: usize) -> Transaction {
    let mut tx = Transaction {
        id: TransactionId::new([byte; 32]),
        inputs,
        outputs: (0..outputs)
            .map(|i| OutputBody::basic(100 + i as u64))
            .collect(),
        allotments: vec![],
        creation_time: Timestamp::new(byte as u64),
        commitment_ref: CommitmentId::ZERO,
    };
    tx.id = tx.compute_id();
    tx
}

/// Default parameters put time `t` into slot `t / 10 + 1`.
fn make_block(
    issuer: u8,
    time: u64,
    strong_parents: Vec<BlockId>,
    payload: Option<Transaction>,
) -> Block {
    let mut block = Block {
        id: BlockId::ZERO,
        issuer_id: account(issuer),
        issuing_time: Timestamp::new(time),
        slot: SlotIndex::new(time / 10 + 1),
        strong_parents,
        weak_parents: vec![],
        shallow_like_parents: vec![],
        payload: payload.map(Payload::Transaction),
        slot_commitment_ref: CommitmentId::ZERO,
        slot_commitment_slot: SlotIndex::GENESIS,
    };
    block.id = block.compute_id();
    block
}

/// A linear chain of five blocks from rotating issuers: enough witnessing to
/// accept through slot 4 and commit slots 1 and 2.
fn feed_linear_chain(engine: &Engine, tx1: Option<Transaction>) -> Vec<Block> {
    let b1 = make_block(1, 5, vec![], tx1);
    let b2 = make_block(2, 15, vec![b1.id], None);
    let b3 = make_block(3, 25, vec![b2.id], None);
    let b4 = make_block(1, 35, vec![b3.id], None);
    let b5 = make_block(2, 45, vec![b4.id], None);
    for block in [&b1, &b2, &b3, &b4, &b5] {
        engine.process_block(block.clone()).unwrap();
    }
    vec![b1, b2, b3, b4, b5]
}

// ── linear chain: transaction to committed slot ─────────────────────────

#[test]
fn linear_chain_commits_transaction() {
    let engine = test_engine();
    let recorder = Recorder::attach(&engine);

    let tx1 = make_tx(1, vec![genesis_output_id()], 1);
    feed_linear_chain(&engine, Some(tx1.clone()));

    // Accepted time reached slot 4; slots 1 and 2 are old enough to commit.
    assert_eq!(recorder.committed_slots(), vec![1, 2]);

    // The genesis output was destroyed, tx1's output created.
    let utxo = engine.utxo_ledger();
    assert!(!utxo.is_unspent(genesis_output_id()).unwrap());
    assert!(utxo.is_unspent(OutputId::new(tx1.id, 0)).unwrap());

    let diff = utxo.slot_diff(SlotIndex::new(1)).unwrap();
    assert_eq!(diff.created, vec![OutputId::new(tx1.id, 0)]);
    assert_eq!(diff.consumed.len(), 1);
    assert_eq!(diff.consumed[0].output_id, genesis_output_id());

    // The commitment chain is intact and carries attestation weight.
    let latest = engine.latest_commitment().unwrap();
    assert_eq!(latest.slot, SlotIndex::new(2));
    let first = engine.storage().load_commitment(SlotIndex::new(1)).unwrap();
    assert_eq!(latest.prev_id, first.id());
    assert!(latest.cumulative_weight >= first.cumulative_weight);
    assert!(first.cumulative_weight > 0);
}

#[test]
fn pipeline_emits_lifecycle_events() {
    let engine = test_engine();
    let recorder = Recorder::attach(&engine);

    let blocks = feed_linear_chain(&engine, None);
    let first = blocks[0].id;

    assert!(recorder
        .contains(|e| matches!(e, EngineEvent::BlockReceived { id } if *id == first)));
    assert!(recorder.contains(|e| matches!(e, EngineEvent::BlockSolid { id } if *id == first)));
    assert!(recorder.contains(|e| matches!(e, EngineEvent::BlockBooked { id } if *id == first)));
    assert!(recorder
        .contains(|e| matches!(e, EngineEvent::BlockAccepted { id } if *id == first)));
    assert!(recorder
        .contains(|e| matches!(e, EngineEvent::BlockConfirmed { id } if *id == first)));
}

// ── intra-pool spending chains ──────────────────────────────────────────

#[test]
fn spending_chain_commits_in_order_and_evicts_committed() {
    let engine = test_engine();

    let tx1 = make_tx(1, vec![genesis_output_id()], 1);
    let tx2 = make_tx(2, vec![OutputId::new(tx1.id, 0)], 1);
    let tx3 = make_tx(3, vec![OutputId::new(tx2.id, 0)], 1);

    let b1 = make_block(1, 5, vec![], Some(tx1.clone()));
    let b2 = make_block(2, 15, vec![b1.id], Some(tx2.clone()));
    let b3 = make_block(3, 25, vec![b2.id], Some(tx3.clone()));
    let b4 = make_block(1, 35, vec![b3.id], None);
    let b5 = make_block(2, 45, vec![b4.id], None);
    for block in [&b1, &b2, &b3, &b4, &b5] {
        engine.process_block(block.clone()).unwrap();
    }

    // Slots 1 and 2 committed and evicted: tx1 and tx2 left the pool.
    assert!(engine.mempool().transaction_metadata(&tx1.id).is_none());
    assert!(engine.mempool().transaction_metadata(&tx2.id).is_none());

    // tx3 (slot 3) is accepted but still waiting for its commit slot.
    let meta3 = engine.mempool().transaction_metadata(&tx3.id).unwrap();
    assert!(meta3.accepted);
    assert_eq!(meta3.committed, None);

    // The intermediate output lives in the ledger and is already spent.
    let utxo = engine.utxo_ledger();
    assert!(!utxo.is_unspent(OutputId::new(tx1.id, 0)).unwrap());
    assert!(utxo.is_unspent(OutputId::new(tx2.id, 0)).unwrap());
}

// ── double spend ────────────────────────────────────────────────────────

#[test]
fn double_spend_resolves_by_committee_vote() {
    let engine = test_engine();

    let tx_a = make_tx(0xA, vec![genesis_output_id()], 1);
    let tx_b = make_tx(0xB, vec![genesis_output_id()], 1);
    let tx_c = make_tx(0xC, vec![OutputId::new(tx_b.id, 0)], 1);

    // Seats 1 and 2 issue the conflicting spends; a spender of tx_b rides on
    // tx_b's block.
    let b_a = make_block(1, 5, vec![], Some(tx_a.clone()));
    let b_b = make_block(2, 6, vec![], Some(tx_b.clone()));
    let b_c = make_block(2, 7, vec![b_b.id], Some(tx_c.clone()));
    engine.process_block(b_a.clone()).unwrap();
    engine.process_block(b_b.clone()).unwrap();
    engine.process_block(b_c.clone()).unwrap();

    let dag = engine.conflict_dag();
    assert!(dag.acceptance_state(&[tx_a.id]).unwrap().is_pending());

    // The third seat endorses tx_a's block: weight 2 of 3 crosses the
    // threshold.
    let b_d = make_block(3, 15, vec![b_a.id], None);
    engine.process_block(b_d).unwrap();

    assert!(dag.acceptance_state(&[tx_a.id]).unwrap().is_accepted());
    assert!(dag.acceptance_state(&[tx_b.id]).unwrap().is_rejected());
    assert!(dag.acceptance_state(&[tx_c.id]).unwrap().is_rejected());

    let meta_b = engine.mempool().transaction_metadata(&tx_b.id).unwrap();
    assert!(meta_b.rejected);
    assert!(meta_b.orphaned.is_some());
    // The spender of the losing branch is orphaned no earlier.
    let meta_c = engine.mempool().transaction_metadata(&tx_c.id).unwrap();
    assert!(meta_c.orphaned.unwrap() >= meta_b.orphaned.unwrap());
}

// ── orphanage by eviction ───────────────────────────────────────────────

#[test]
fn unreferenced_transaction_is_orphaned_when_its_slot_evicts() {
    let engine = test_engine();

    // tx1 rides a block nobody ever references.
    let tx1 = make_tx(1, vec![genesis_output_id()], 1);
    let lonely = make_block(1, 5, vec![], Some(tx1.clone()));
    engine.process_block(lonely).unwrap();

    // A parallel chain drives acceptance past slot 3 and commits slot 1.
    let r1 = make_block(2, 6, vec![], None);
    let r2 = make_block(3, 15, vec![r1.id], None);
    let r3 = make_block(1, 25, vec![r2.id], None);
    let r4 = make_block(2, 35, vec![r3.id], None);
    for block in [&r1, &r2, &r3, &r4] {
        engine.process_block(block.clone()).unwrap();
    }

    let meta = engine.mempool().transaction_metadata(&tx1.id).unwrap();
    assert_eq!(meta.orphaned, Some(SlotIndex::new(1)));
    assert_eq!(meta.committed, None);
}

// ── solidification ──────────────────────────────────────────────────────

#[test]
fn missing_parent_is_requested_and_resolved() {
    let engine = test_engine();
    let recorder = Recorder::attach(&engine);

    let b1 = make_block(1, 5, vec![], None);
    let b2 = make_block(2, 15, vec![b1.id], None);

    // Child first: parked, parent requested.
    engine.process_block(b2.clone()).unwrap();
    assert!(recorder.contains(|event| matches!(
        event,
        EngineEvent::RequestBlock { id } if *id == b1.id
    )));
    assert!(!engine.block(&b2.id).unwrap().is_booked);

    // Parent arrives: both book.
    engine.process_block(b1.clone()).unwrap();
    assert!(engine.block(&b1.id).unwrap().is_booked);
    assert!(engine.block(&b2.id).unwrap().is_booked);
}

#[test]
fn duplicate_blocks_are_filtered() {
    let engine = test_engine();
    let recorder = Recorder::attach(&engine);

    let b1 = make_block(1, 5, vec![], None);
    engine.process_block(b1.clone()).unwrap();
    engine.process_block(b1.clone()).unwrap();

    assert!(recorder.contains(|event| matches!(
        event,
        EngineEvent::BlockFiltered { id, .. } if *id == b1.id
    )));
}

#[test]
fn spending_a_committed_spent_output_is_invalid() {
    let engine = test_engine();
    let recorder = Recorder::attach(&engine);

    let tx1 = make_tx(1, vec![genesis_output_id()], 1);
    let blocks = feed_linear_chain(&engine, Some(tx1));

    // Genesis is spent in the committed ledger now.
    let tx_bad = make_tx(9, vec![genesis_output_id()], 1);
    let bad_block = make_block(3, 55, vec![blocks[4].id], Some(tx_bad));
    engine.process_block(bad_block.clone()).unwrap();

    assert!(recorder.contains(|event| matches!(
        event,
        EngineEvent::BlockInvalid { id, .. } if *id == bad_block.id
    )));
    assert!(engine.block(&bad_block.id).unwrap().is_invalid);
}

// ── chain management surface ────────────────────────────────────────────

#[test]
fn unknown_commitment_parent_is_requested() {
    let engine = test_engine();
    let recorder = Recorder::attach(&engine);

    let orphan = Commitment {
        slot: SlotIndex::new(7),
        prev_id: CommitmentId::new([0xEE; 32]),
        roots_id: [0u8; 32],
        cumulative_weight: 70,
    };
    engine.process_commitment(orphan).unwrap();

    assert!(recorder.contains(|event| matches!(
        event,
        EngineEvent::RequestCommitment { id } if *id == CommitmentId::new([0xEE; 32])
    )));
}

#[test]
fn heavier_fork_walks_the_switching_ladder() {
    let engine = test_engine();
    let recorder = Recorder::attach(&engine);

    feed_linear_chain(&engine, None);
    let local_first = engine.storage().load_commitment(SlotIndex::new(1)).unwrap();

    // A fork at slot 2 claiming far more weight than we verified.
    let fork = Commitment {
        slot: SlotIndex::new(2),
        prev_id: local_first.id(),
        roots_id: [9u8; 32],
        cumulative_weight: 1000,
    };
    engine.process_commitment(fork).unwrap();
    assert!(recorder.contains(|event| matches!(
        event,
        EngineEvent::RequestAttestations { chain } if *chain == fork.id()
    )));

    // Committee attestations for the fork convert claimed into attested
    // weight and start warp sync from the forking point.
    let attestations: Vec<_> = (1..=3u8)
        .map(|issuer| strata_types::Attestation {
            issuer_id: account(issuer),
            commitment_id: fork.id(),
            commitment_slot: fork.slot,
            issuing_time: Timestamp::new(100 + issuer as u64),
            signature: strata_types::Signature::ZERO,
        })
        .collect();
    engine.process_attestations(fork.id(), &attestations).unwrap();

    assert!(recorder.contains(|event| matches!(
        event,
        EngineEvent::RequestWarpSync { chain, from, .. }
            if *chain == fork.id() && *from == SlotIndex::new(2)
    )));
}

// ── snapshots and determinism ───────────────────────────────────────────

#[test]
fn snapshot_roundtrip_preserves_state_roots() {
    let engine = test_engine();
    let tx1 = make_tx(1, vec![genesis_output_id()], 1);
    feed_linear_chain(&engine, Some(tx1));

    let mut snapshot = Vec::new();
    engine.export_snapshot(&mut snapshot).unwrap();

    let restored = Engine::new(
        EngineConfig::default(),
        Arc::new(MemoryStore::new()),
        committee(),
    )
    .unwrap();
    restored
        .import_snapshot(&mut std::io::Cursor::new(&snapshot))
        .unwrap();

    assert_eq!(
        engine.latest_commitment().unwrap(),
        restored.latest_commitment().unwrap()
    );
    assert_eq!(
        engine.utxo_ledger().state_tree_root(),
        restored.utxo_ledger().state_tree_root()
    );
    assert_eq!(
        engine.accounts_ledger().accounts_tree_root(),
        restored.accounts_ledger().accounts_tree_root()
    );

    let mut reexported = Vec::new();
    restored.export_snapshot(&mut reexported).unwrap();
    assert_eq!(snapshot, reexported);
}

#[test]
fn replicas_fed_the_same_blocks_agree() {
    let tx1 = make_tx(1, vec![genesis_output_id()], 1);

    let run = || {
        let engine = test_engine();
        feed_linear_chain(&engine, Some(tx1.clone()));
        (
            engine.latest_commitment().unwrap().id(),
            engine.utxo_ledger().state_tree_root(),
            engine.accounts_ledger().accounts_tree_root(),
        )
    };

    assert_eq!(run(), run());
}

#[test]
fn engine_reports_health_and_stops_on_shutdown() {
    let engine = test_engine();
    assert_eq!(engine.health(), HealthStatus::Healthy);

    engine.shutdown();
    assert_eq!(engine.health(), HealthStatus::Stopped);

    let block = make_block(1, 5, vec![], None);
    assert!(engine.process_block(block).is_err());
}
