//! Engine orchestration.
//!
//! One engine owns one replica of the ledger: the block cache and acceptance
//! gadget, the mempool and conflict DAG, both ledgers, the attestation
//! manager, notarization and the chain manager. `process_block` drives the
//! whole pipeline: solidify, book, vote, accept, notarize, evict.

use crate::booker::{BookOutcome, Booker};
use crate::causal_order::CausalOrder;
use crate::chain_manager::{ChainAction, ChainManager};
use crate::config::EngineConfig;
use crate::error::{EngineError, ErrorKind, HealthStatus};
use crate::events::{EngineEvent, EventBus};
use crate::notarization::NotarizationManager;
use crate::worker_pool::WorkerPools;
use std::collections::{HashSet, VecDeque};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, RwLock};
use strata_conflict::{ConflictDag, ConflictEvent, Vote};
use strata_consensus::{AcceptanceGadget, AttestationManager, Committee, GadgetEvent};
use strata_ledger::{AccountData, AccountsLedger, UtxoLedger};
use strata_mempool::{LedgerStateResolver, Mempool, MempoolEvent};
use strata_store::{KVStore, Storage};
use strata_types::{
    Attestation, Block, BlockId, Commitment, CommitmentId, Output, OutputId, SlotIndex,
    TransactionId,
};

/// Bound on the recently-evicted block dedup set.
const MAX_RECENTLY_EVICTED: usize = 65_536;

pub struct Engine {
    config: EngineConfig,
    committee: Arc<Committee>,
    storage: Arc<Storage>,
    utxo: Arc<UtxoLedger>,
    accounts: Arc<AccountsLedger>,
    conflict_dag: Arc<ConflictDag<TransactionId, OutputId>>,
    mempool: Arc<Mempool>,
    gadget: Arc<AcceptanceGadget>,
    attestations: Arc<AttestationManager>,
    booker: Booker,
    notarization: NotarizationManager,
    chain_manager: ChainManager,
    pools: WorkerPools,
    events: Arc<EventBus>,
    /// Blocks waiting for parents to arrive at all.
    solidification: Mutex<CausalOrder>,
    /// Blocks evicted with their committed slot; parents found here count as
    /// known during solidification.
    recently_evicted: Mutex<(HashSet<BlockId>, VecDeque<BlockId>)>,
    /// Blocks whose payload booked after the block arrived; re-booked at the
    /// top of the pipeline to keep booking non-reentrant.
    payload_retries: Mutex<Vec<BlockId>>,
    health: RwLock<HealthStatus>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        kv: Arc<dyn KVStore>,
        committee: Arc<Committee>,
    ) -> Result<Arc<Self>, EngineError> {
        let storage = Arc::new(Storage::new(kv, config.params.slots_per_epoch));
        storage.set_protocol_parameters(&config.params)?;

        let utxo = Arc::new(UtxoLedger::new(Arc::clone(&storage))?);
        let accounts = Arc::new(AccountsLedger::new(Arc::clone(&storage))?);
        let conflict_dag = Arc::new(ConflictDag::new(
            Arc::clone(&committee) as Arc<dyn strata_conflict::WeightProvider>
        ));
        let resolver = Arc::new(LedgerStateResolver::new(Arc::clone(&utxo)));
        let mempool = Arc::new(Mempool::new(Arc::clone(&conflict_dag), resolver));
        let gadget = Arc::new(AcceptanceGadget::new(Arc::clone(&committee)));
        let attestations = Arc::new(AttestationManager::new(
            Arc::clone(&committee),
            Arc::clone(&storage),
            config.params.attestation_commitment_offset,
        ));

        let booker = Booker::new(
            Arc::clone(&gadget),
            Arc::clone(&mempool),
            Arc::clone(&conflict_dag),
            config.max_pending_blocks,
        );
        let notarization = NotarizationManager::new(
            config.params.clone(),
            Arc::clone(&storage),
            Arc::clone(&utxo),
            Arc::clone(&accounts),
            Arc::clone(&mempool),
            Arc::clone(&attestations),
            Arc::clone(&gadget),
        );
        let chain_manager =
            ChainManager::new(config.params.clone(), storage.latest_commitment()?);

        let workers_per_pool = config.workers_per_pool;
        let engine = Arc::new(Self {
            config,
            committee,
            storage,
            utxo,
            accounts,
            conflict_dag,
            mempool,
            gadget,
            attestations,
            booker,
            notarization,
            chain_manager,
            pools: WorkerPools::new(workers_per_pool),
            events: Arc::new(EventBus::new()),
            solidification: Mutex::new(CausalOrder::new(16_384)),
            recently_evicted: Mutex::new((HashSet::new(), VecDeque::new())),
            payload_retries: Mutex::new(Vec::new()),
            health: RwLock::new(HealthStatus::Healthy),
        });
        engine.wire_conflict_events();
        engine.wire_mempool_events();
        Ok(engine)
    }

    /// Relay conflict outcomes into the mempool's inclusion flags.
    fn wire_conflict_events(self: &Arc<Self>) {
        let pool = Arc::downgrade(&self.mempool);
        let gadget = Arc::downgrade(&self.gadget);
        self.conflict_dag.subscribe(Box::new(move |event| {
            let Some(pool) = pool.upgrade() else {
                return;
            };
            match event {
                ConflictEvent::ConflictAccepted { id } => pool.mark_accepted(*id),
                ConflictEvent::ConflictRejected { id } => {
                    let slot = gadget
                        .upgrade()
                        .map(|gadget| gadget.latest_accepted_slot())
                        .unwrap_or(SlotIndex::GENESIS)
                        .max(SlotIndex::new(1));
                    pool.mark_rejected(*id, slot);
                }
                _ => {}
            }
        }));
    }

    /// Surface mempool outcomes: orphanage becomes an engine event, invalid
    /// payloads invalidate their attaching blocks, and blocks that waited on
    /// a payload get queued for a booking retry.
    fn wire_mempool_events(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.mempool.subscribe(Box::new(move |event| {
            let Some(engine) = weak.upgrade() else {
                return;
            };
            match event {
                MempoolEvent::TransactionOrphaned { id, slot } => {
                    engine.events.emit(&EngineEvent::TransactionOrphaned {
                        id: *id,
                        slot: *slot,
                    });
                }
                MempoolEvent::TransactionInvalid { attachments, .. } => {
                    for block in attachments {
                        engine.gadget.mark_invalid(block);
                        engine.events.emit(&EngineEvent::BlockInvalid {
                            id: *block,
                            reason: "payload transaction is invalid".into(),
                        });
                    }
                }
                MempoolEvent::TransactionBooked { id } => {
                    if let Some(meta) = engine.mempool.transaction_metadata(id) {
                        let mut retries =
                            engine.payload_retries.lock().expect("retry queue poisoned");
                        retries.extend(meta.attachments);
                    }
                }
                _ => {}
            }
        }));
    }

    // ── accessors ────────────────────────────────────────────────────────

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn committee(&self) -> &Arc<Committee> {
        &self.committee
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn conflict_dag(&self) -> &Arc<ConflictDag<TransactionId, OutputId>> {
        &self.conflict_dag
    }

    pub fn utxo_ledger(&self) -> &Arc<UtxoLedger> {
        &self.utxo
    }

    pub fn accounts_ledger(&self) -> &Arc<AccountsLedger> {
        &self.accounts
    }

    pub fn attestation_manager(&self) -> &Arc<AttestationManager> {
        &self.attestations
    }

    pub fn chain_manager(&self) -> &ChainManager {
        &self.chain_manager
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn worker_pools(&self) -> &WorkerPools {
        &self.pools
    }

    pub fn block(&self, id: &BlockId) -> Option<strata_consensus::BlockMetadata> {
        self.gadget.block(id)
    }

    pub fn latest_commitment(&self) -> Result<Commitment, EngineError> {
        Ok(self.storage.latest_commitment()?)
    }

    pub fn health(&self) -> HealthStatus {
        let health = *self.health.read().expect("health lock poisoned");
        if health == HealthStatus::Stopped {
            return health;
        }
        if self.booker.pending_count() > self.config.max_pending_blocks / 2 {
            return HealthStatus::Degraded;
        }
        health
    }

    /// Seed an unspent output before any slot is committed.
    pub fn add_genesis_output(&self, output: &Output) -> Result<(), EngineError> {
        Ok(self.utxo.add_unspent_output(output)?)
    }

    /// Seed an account before any slot is committed.
    pub fn add_genesis_account(&self, account: &AccountData) -> Result<(), EngineError> {
        Ok(self.accounts.add_account(account)?)
    }

    // ── block ingest ─────────────────────────────────────────────────────

    /// Feed a serialized block into the pipeline.
    pub fn process_block_bytes(&self, bytes: &[u8]) -> Result<(), EngineError> {
        let block: Block = bincode::deserialize(bytes)
            .map_err(|e| strata_types::TypeError::Serialization(e.to_string()))?;
        if block.id != block.compute_id() {
            let id = block.id;
            self.events.emit(&EngineEvent::BlockFiltered {
                id,
                reason: "block ID does not match content".into(),
            });
            return Ok(());
        }
        self.process_block(block)
    }

    /// Feed one parsed block into the pipeline.
    pub fn process_block(&self, block: Block) -> Result<(), EngineError> {
        if *self.health.read().expect("health lock poisoned") == HealthStatus::Stopped {
            return Err(EngineError::Shutdown);
        }

        let id = block.id;
        self.events.emit(&EngineEvent::BlockReceived { id });

        if !self.gadget.insert_block(block) {
            self.events.emit(&EngineEvent::BlockFiltered {
                id,
                reason: "duplicate".into(),
            });
            return Ok(());
        }

        // The new block may solidify blocks that waited for it.
        let newly_solidifiable = {
            let mut solidification =
                self.solidification.lock().expect("solidification poisoned");
            solidification.mark_done(id)
        };

        let result = self.solidify_and_book(id);
        self.handle_result(result)?;
        for waiter in newly_solidifiable {
            let result = self.solidify_and_book(waiter);
            self.handle_result(result)?;
        }

        // Blocks whose payload booked as a side effect retry now, at the top
        // of the pipeline.
        loop {
            let retries: Vec<BlockId> = {
                let mut queue = self.payload_retries.lock().expect("retry queue poisoned");
                std::mem::take(&mut *queue)
            };
            if retries.is_empty() {
                break;
            }
            for block_id in retries {
                if self
                    .gadget
                    .block(&block_id)
                    .is_some_and(|meta| meta.is_solid && !meta.is_booked && !meta.is_invalid)
                {
                    let result = self.drive_booking(block_id);
                    self.handle_result(result)?;
                }
            }
        }
        Ok(())
    }

    fn is_known_or_evicted(&self, id: &BlockId) -> bool {
        if self.gadget.contains(id) {
            return true;
        }
        let recently_evicted = self.recently_evicted.lock().expect("eviction set poisoned");
        recently_evicted.0.contains(id)
    }

    fn solidify_and_book(&self, id: BlockId) -> Result<(), EngineError> {
        let meta = self.gadget.block(&id).ok_or(EngineError::UnknownBlock(id))?;

        let missing: Vec<BlockId> = meta
            .block
            .all_parents()
            .filter(|parent| !self.is_known_or_evicted(parent))
            .copied()
            .collect();

        if !missing.is_empty() {
            let registered = {
                let mut solidification =
                    self.solidification.lock().expect("solidification poisoned");
                solidification.wait_for(id, missing.clone())
            };
            if !registered {
                return Err(EngineError::QueueFull {
                    queue: "solidification",
                });
            }
            for parent in missing {
                self.events.emit(&EngineEvent::RequestBlock { id: parent });
            }
            return Ok(());
        }

        if !meta.is_solid {
            self.gadget.mark_solid(&id);
            self.events.emit(&EngineEvent::BlockSolid { id });
        }
        self.drive_booking(id)
    }

    fn drive_booking(&self, start: BlockId) -> Result<(), EngineError> {
        let mut queue = vec![start];
        while let Some(id) = queue.pop() {
            match self.booker.book(&id)? {
                BookOutcome::Booked { released } => {
                    self.events.emit(&EngineEvent::BlockBooked { id });
                    self.on_block_booked(&id)?;
                    queue.extend(released);
                }
                BookOutcome::WaitingForParents { .. } => {
                    // Released by the causal-order queue when parents book.
                }
                BookOutcome::WaitingForPayload => {
                    // Retried when the payload's inputs resolve via a later
                    // attachment of the producing transaction.
                }
                BookOutcome::Invalid { reason } => {
                    self.events.emit(&EngineEvent::BlockInvalid { id, reason });
                }
            }
        }
        Ok(())
    }

    fn on_block_booked(&self, id: &BlockId) -> Result<(), EngineError> {
        let meta = self
            .gadget
            .block(id)
            .ok_or(EngineError::UnknownBlock(*id))?;

        // The issuer's seat votes on the block's conflicts.
        if let Some(seat) = self.committee.seat(&meta.block.issuer_id) {
            if !meta.conflict_ids.is_empty() {
                let vote = Vote::new(seat, meta.block.issuing_time.as_secs());
                if let Err(error) = self.conflict_dag.cast_votes(vote, &meta.conflict_ids) {
                    self.events.emit(&EngineEvent::Error {
                        kind: ErrorKind::Invalid,
                        context: format!("vote of block {id} not applied: {error}"),
                    });
                }
            }
        }

        self.attestations.add_attestation_from_block(&meta.block);
        self.accounts.track_block(&meta.block);

        // Witness-weight propagation, then notarization on accepted time.
        for event in self.gadget.process_booked_block(id)? {
            match event {
                GadgetEvent::BlockAccepted(accepted_id) => {
                    self.events
                        .emit(&EngineEvent::BlockAccepted { id: accepted_id });
                    if let Some(accepted) = self.gadget.block(&accepted_id) {
                        if accepted.block.transaction().is_some() {
                            self.mempool.mark_attachment_included(accepted_id)?;
                        }
                    }
                }
                GadgetEvent::BlockConfirmed(confirmed_id) => {
                    self.events
                        .emit(&EngineEvent::BlockConfirmed { id: confirmed_id });
                }
            }
        }

        let produced = self
            .notarization
            .try_commit_until(self.gadget.latest_accepted_slot())?;
        for commitment in produced {
            self.chain_manager.process_local_commitment(commitment);
            let actions = self.chain_manager.mark_verified(&commitment.id());
            self.events.emit(&EngineEvent::SlotCommitted { commitment });
            self.evict_slot(commitment.slot);
            self.dispatch_chain_actions(actions);
        }
        Ok(())
    }

    /// Advance the eviction cursor past a committed slot.
    fn evict_slot(&self, slot: SlotIndex) {
        let evicted = self.gadget.evict_slot(slot);
        {
            let mut recently_evicted =
                self.recently_evicted.lock().expect("eviction set poisoned");
            let (set, order) = &mut *recently_evicted;
            for id in evicted {
                if set.insert(id) {
                    order.push_back(id);
                    if set.len() > MAX_RECENTLY_EVICTED {
                        if let Some(oldest) = order.pop_front() {
                            set.remove(&oldest);
                        }
                    }
                }
            }
        }
        self.mempool.evict(slot);
        self.chain_manager.evict();
    }

    /// Feed a block through the booker worker pool, serialized per slot so
    /// different slot regions book in parallel while causal order holds.
    pub async fn process_block_pooled(
        self: &Arc<Self>,
        block: Block,
    ) -> Result<(), EngineError> {
        let engine = Arc::clone(self);
        let key = block.slot.as_u64().to_string();
        match self
            .pools
            .booker
            .submit(&key, move || engine.process_block(block))
            .await
        {
            Some(result) => result,
            None => Err(EngineError::Shutdown),
        }
    }

    /// Drop on-disk history for epochs old enough relative to the latest
    /// committed slot. Pruning and commit are mutually exclusive.
    pub fn prune(&self) -> Result<strata_store::PruneOutcome, EngineError> {
        let latest = self.storage.latest_commitment()?;
        let latest_epoch = self.config.params.epoch_index(latest.slot);
        let target = match latest_epoch
            .as_u64()
            .checked_sub(self.config.min_retained_epochs + 1)
        {
            Some(target) => strata_types::EpochIndex::new(target),
            None => return Ok(strata_store::PruneOutcome::NotEnoughHistory),
        };

        let outcome =
            self.storage
                .prune_until(target, latest_epoch, self.config.min_retained_epochs)?;
        if let strata_store::PruneOutcome::EpochPruned(epoch) = outcome {
            let last_slot = epoch.last_slot(self.config.params.slots_per_epoch);
            self.utxo.prune_spents_until(last_slot)?;
        }
        Ok(outcome)
    }

    // ── commitment / attestation / warp-sync ingest ──────────────────────

    /// A commitment received from a peer, in wire form.
    pub fn process_commitment_bytes(&self, bytes: &[u8]) -> Result<(), EngineError> {
        let commitment = Commitment::from_wire_bytes(bytes)?;
        self.process_commitment(commitment)
    }

    /// A commitment received from a peer.
    pub fn process_commitment(&self, commitment: Commitment) -> Result<(), EngineError> {
        let actions = self.chain_manager.process_commitment(commitment);
        self.dispatch_chain_actions(actions);
        Ok(())
    }

    /// Attestations received for a candidate chain's commitment. Attestation
    /// signatures were checked by the filter layer; here only committee
    /// membership and the commitment reference count.
    pub fn process_attestations(
        &self,
        commitment_id: CommitmentId,
        attestations: &[Attestation],
    ) -> Result<(), EngineError> {
        let attested_weight: u64 = attestations
            .iter()
            .filter(|attestation| attestation.commitment_id == commitment_id)
            .map(|attestation| self.committee.weight_of_account(&attestation.issuer_id))
            .sum();
        if attested_weight == 0 {
            return Ok(());
        }
        let actions = self.chain_manager.mark_attested(&commitment_id);
        self.dispatch_chain_actions(actions);
        Ok(())
    }

    /// Blocks delivered by warp sync for a candidate chain.
    pub fn process_warp_sync_response(&self, blocks: Vec<Block>) -> Result<(), EngineError> {
        for block in blocks {
            self.process_block(block)?;
        }
        Ok(())
    }

    fn dispatch_chain_actions(&self, actions: Vec<ChainAction>) {
        for action in actions {
            match action {
                ChainAction::RequestCommitment(id) => {
                    self.events.emit(&EngineEvent::RequestCommitment { id });
                }
                ChainAction::RequestAttestations { chain } => {
                    self.events.emit(&EngineEvent::RequestAttestations { chain });
                }
                ChainAction::BeginWarpSync { chain, from, to } => {
                    self.events
                        .emit(&EngineEvent::RequestWarpSync { chain, from, to });
                }
                ChainAction::SwitchMainChain {
                    chain,
                    forking_point,
                } => {
                    let result = self.switch_to_chain(chain, forking_point);
                    if let Err(error) = self.handle_result(result) {
                        tracing::error!(%error, "chain switch failed");
                    }
                }
            }
        }
    }

    /// Switch the main chain: roll every subsystem back to the forking point
    /// and adopt the candidate. The candidate's blocks then replay through
    /// the regular pipeline.
    fn switch_to_chain(
        &self,
        chain: CommitmentId,
        forking_point: Commitment,
    ) -> Result<(), EngineError> {
        let target = forking_point.slot.prev();

        let mut index = self.utxo.ledger_index();
        while index > target {
            self.utxo.rollback_diff(index)?;
            index = index.prev();
        }
        self.accounts.rollback(target)?;
        self.attestations.rollback(target);
        self.storage.rollback_commitments(target)?;

        self.chain_manager.switch_main(&chain);
        self.events.emit(&EngineEvent::ChainSwitched { chain });
        tracing::info!(chain = %chain, slot = target.as_u64(), "switched main chain");
        Ok(())
    }

    // ── snapshot ─────────────────────────────────────────────────────────

    /// Export the engine state: the latest commitment header followed by the
    /// framed `utxo_ledger`, `accounts_ledger` and `attestations` sections.
    pub fn export_snapshot<W: Write>(&self, writer: &mut W) -> Result<(), EngineError> {
        let latest = self.storage.latest_commitment()?;
        writer
            .write_all(&latest.to_wire_bytes())
            .map_err(|e| strata_ledger::LedgerError::SnapshotFormat(e.to_string()))?;

        self.utxo.export(writer)?;
        self.accounts.export(writer)?;
        self.attestations.export(writer, latest.slot)?;
        Ok(())
    }

    /// Import a snapshot into a freshly constructed engine.
    pub fn import_snapshot<R: Read>(&self, reader: &mut R) -> Result<(), EngineError> {
        let mut header = [0u8; Commitment::WIRE_LENGTH];
        reader
            .read_exact(&mut header)
            .map_err(|e| strata_ledger::LedgerError::SnapshotFormat(e.to_string()))?;
        let latest = Commitment::from_wire_bytes(&header)?;

        self.utxo.import(reader)?;
        self.accounts.import(reader)?;
        self.attestations.import(reader)?;

        self.utxo.set_ledger_index(latest.slot)?;
        self.accounts.set_latest_committed_slot(latest.slot)?;
        self.storage.store_commitment(&latest)?;
        self.storage.set_latest_commitment(&latest)?;
        Ok(())
    }

    // ── error handling and shutdown ──────────────────────────────────────

    /// Map errors onto the taxonomy: fatal errors stop the engine and
    /// propagate, everything else becomes an error event.
    fn handle_result(&self, result: Result<(), EngineError>) -> Result<(), EngineError> {
        match result {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => {
                *self.health.write().expect("health lock poisoned") = HealthStatus::Stopped;
                self.events.emit(&EngineEvent::Error {
                    kind: ErrorKind::Fatal,
                    context: error.to_string(),
                });
                Err(error)
            }
            Err(error) => {
                self.events.emit(&EngineEvent::Error {
                    kind: error.kind(),
                    context: error.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Cooperative shutdown: worker pools drain as no-ops and storage
    /// handles are released.
    pub fn shutdown(&self) {
        *self.health.write().expect("health lock poisoned") = HealthStatus::Stopped;
        self.pools.shutdown();
        self.conflict_dag.shutdown();
        tracing::info!("engine stopped");
    }
}
