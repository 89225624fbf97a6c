//! The transaction pool.
//!
//! Attachments may arrive in any order. A transaction books once every input
//! resolves, either against an in-flight pool output or against the
//! committed UTXO ledger; booking registers one conflict per transaction in
//! the conflict DAG, keyed by the spent outputs, with the conflicts of
//! in-pool input producers as parents.
//!
//! Conflict DAG calls and event emission happen outside the pool lock, so
//! listeners may call back into the pool.

use crate::error::MempoolError;
use crate::events::{MempoolEvent, MempoolEventSink};
use crate::promise::ResolveError;
use crate::resolver::StateResolver;
use crate::state_diff::{CreatedState, DestroyedState, StateDiff};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use strata_conflict::ConflictDag;
use strata_types::{
    BlockId, Output, OutputBody, OutputId, SlotIndex, Transaction, TransactionId,
};

/// Lifecycle of a pooled transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxLifecycle {
    /// Waiting for at least one input to resolve.
    Unsolid,
    /// All inputs resolved, conflict registration in flight.
    Solid,
    /// Registered in the conflict DAG.
    Booked,
    /// An input is unresolvable; the transaction can never apply.
    Invalid,
}

/// Public snapshot of a pooled transaction's state.
#[derive(Clone, Debug)]
pub struct TransactionMetadata {
    pub transaction: Transaction,
    pub lifecycle: TxLifecycle,
    pub attachments: Vec<BlockId>,
    pub earliest_included: Option<(SlotIndex, BlockId)>,
    pub accepted: bool,
    pub rejected: bool,
    pub committed: Option<SlotIndex>,
    pub orphaned: Option<SlotIndex>,
    pub conflict_ids: Vec<TransactionId>,
}

/// Where an output reference currently lives.
#[derive(Clone, Debug)]
pub enum StateMetadata {
    /// A committed, unspent ledger output.
    Committed(Output),
    /// An uncommitted output produced by a pooled transaction.
    InPool {
        output_id: OutputId,
        body: OutputBody,
        producer: TransactionId,
    },
    /// Not known to the pool or the ledger.
    Unknown,
}

struct TxEntry {
    tx: Transaction,
    lifecycle: TxLifecycle,
    attachments: BTreeMap<BlockId, SlotIndex>,
    included: BTreeSet<BlockId>,
    earliest_included: Option<(SlotIndex, BlockId)>,
    accepted: bool,
    rejected: bool,
    committed: Option<SlotIndex>,
    orphaned: Option<SlotIndex>,
    resolved_inputs: Vec<Option<Output>>,
    conflict_ids: Vec<TransactionId>,
}

impl TxEntry {
    fn new(tx: Transaction) -> Self {
        let input_count = tx.inputs.len();
        Self {
            tx,
            lifecycle: TxLifecycle::Unsolid,
            attachments: BTreeMap::new(),
            included: BTreeSet::new(),
            earliest_included: None,
            accepted: false,
            rejected: false,
            committed: None,
            orphaned: None,
            resolved_inputs: vec![None; input_count],
            conflict_ids: Vec::new(),
        }
    }

    fn all_inputs_resolved(&self) -> bool {
        self.resolved_inputs.iter().all(Option::is_some)
    }

    fn snapshot(&self) -> TransactionMetadata {
        TransactionMetadata {
            transaction: self.tx.clone(),
            lifecycle: self.lifecycle,
            attachments: self.attachments.keys().copied().collect(),
            earliest_included: self.earliest_included,
            accepted: self.accepted,
            rejected: self.rejected,
            committed: self.committed,
            orphaned: self.orphaned,
            conflict_ids: self.conflict_ids.clone(),
        }
    }
}

/// Conflict registration deferred past the pool lock.
struct ConflictRegistration {
    tx_id: TransactionId,
    inputs: Vec<OutputId>,
    parent_candidates: Vec<TransactionId>,
}

struct PoolInner {
    transactions: HashMap<TransactionId, TxEntry>,
    by_attachment: HashMap<BlockId, TransactionId>,
    /// In-flight outputs of booked transactions.
    producers: HashMap<OutputId, TransactionId>,
    /// Booked spenders per output.
    consumers: HashMap<OutputId, BTreeSet<TransactionId>>,
    /// Transactions waiting for an output to appear.
    waiters: HashMap<OutputId, BTreeSet<TransactionId>>,
}

/// The mempool.
pub struct Mempool {
    conflict_dag: Arc<ConflictDag<TransactionId, OutputId>>,
    resolver: Arc<dyn StateResolver>,
    inner: RwLock<PoolInner>,
    listeners: RwLock<Vec<MempoolEventSink>>,
}

impl Mempool {
    pub fn new(
        conflict_dag: Arc<ConflictDag<TransactionId, OutputId>>,
        resolver: Arc<dyn StateResolver>,
    ) -> Self {
        Self {
            conflict_dag,
            resolver,
            inner: RwLock::new(PoolInner {
                transactions: HashMap::new(),
                by_attachment: HashMap::new(),
                producers: HashMap::new(),
                consumers: HashMap::new(),
                waiters: HashMap::new(),
            }),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: MempoolEventSink) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    fn emit(&self, events: Vec<MempoolEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().expect("listener lock poisoned");
        for event in &events {
            for listener in listeners.iter() {
                listener(event);
            }
        }
    }

    pub fn conflict_dag(&self) -> &Arc<ConflictDag<TransactionId, OutputId>> {
        &self.conflict_dag
    }

    /// Attach a transaction via a block. Idempotent in `(tx.id, block_id)`.
    pub fn attach_transaction(
        &self,
        tx: &Transaction,
        block_id: BlockId,
        block_slot: SlotIndex,
    ) -> Result<TransactionMetadata, MempoolError> {
        let mut events = Vec::new();
        let mut registrations = Vec::new();
        {
            let mut guard = self.inner.write().expect("pool lock poisoned");
            let inner: &mut PoolInner = &mut guard;
            inner.by_attachment.insert(block_id, tx.id);

            if inner.transactions.contains_key(&tx.id) {
                if let Some(entry) = inner.transactions.get_mut(&tx.id) {
                    entry.attachments.insert(block_id, block_slot);
                }
            } else {
                let mut entry = TxEntry::new(tx.clone());
                entry.attachments.insert(block_id, block_slot);
                inner.transactions.insert(tx.id, entry);
                events.push(MempoolEvent::TransactionAttached { id: tx.id });

                self.resolve_inputs_locked(inner, tx.id, &mut events);
                self.book_ready_locked(inner, tx.id, &mut events, &mut registrations);
            }
        }
        self.finish_registrations(registrations, &mut events);
        self.emit(events);

        self.transaction_metadata(&tx.id)
            .ok_or(MempoolError::TransactionNotFound(tx.id))
    }

    /// Resolve whatever inputs can be resolved right now: against in-flight
    /// pool outputs first, then against the committed ledger. Unknown inputs
    /// leave the transaction waiting for the producer to arrive.
    fn resolve_inputs_locked(
        &self,
        inner: &mut PoolInner,
        tx_id: TransactionId,
        events: &mut Vec<MempoolEvent>,
    ) {
        let inputs: Vec<OutputId> = match inner.transactions.get(&tx_id) {
            Some(entry) => entry.tx.inputs.clone(),
            None => return,
        };

        for (index, input) in inputs.iter().enumerate() {
            if inner.transactions[&tx_id].resolved_inputs[index].is_some() {
                continue;
            }

            if let Some(&producer_id) = inner.producers.get(input) {
                if let Some(output) = synthesize_output(inner, producer_id, *input) {
                    if let Some(entry) = inner.transactions.get_mut(&tx_id) {
                        entry.resolved_inputs[index] = Some(output);
                    }
                    continue;
                }
            }

            let request = self.resolver.resolve(*input);
            match request.result() {
                Some(Ok(output)) => {
                    if let Some(entry) = inner.transactions.get_mut(&tx_id) {
                        entry.resolved_inputs[index] = Some(output);
                    }
                }
                Some(Err(ResolveError::AlreadySpent)) => {
                    self.invalidate_locked(inner, tx_id, events);
                    return;
                }
                Some(Err(ResolveError::StateNotFound)) | Some(Err(ResolveError::Cancelled))
                | None => {
                    // The producing transaction may simply not have arrived
                    // yet; park the transaction until the output appears.
                    inner.waiters.entry(*input).or_default().insert(tx_id);
                }
            }
        }
    }

    fn invalidate_locked(
        &self,
        inner: &mut PoolInner,
        tx_id: TransactionId,
        events: &mut Vec<MempoolEvent>,
    ) {
        if let Some(entry) = inner.transactions.get_mut(&tx_id) {
            if entry.lifecycle != TxLifecycle::Invalid {
                entry.lifecycle = TxLifecycle::Invalid;
                events.push(MempoolEvent::TransactionInvalid {
                    id: tx_id,
                    attachments: entry.attachments.keys().copied().collect(),
                });
            }
        }
    }

    /// Book every transaction in the dependency chain starting at `tx_id`
    /// that has all inputs resolved, fulfilling waiters as outputs appear.
    fn book_ready_locked(
        &self,
        inner: &mut PoolInner,
        tx_id: TransactionId,
        events: &mut Vec<MempoolEvent>,
        registrations: &mut Vec<ConflictRegistration>,
    ) {
        let mut worklist = vec![tx_id];
        while let Some(current) = worklist.pop() {
            let ready = matches!(
                inner.transactions.get(&current),
                Some(entry)
                    if entry.lifecycle == TxLifecycle::Unsolid && entry.all_inputs_resolved()
            );
            if !ready {
                continue;
            }

            let (inputs, output_ids) = {
                let entry = inner
                    .transactions
                    .get_mut(&current)
                    .expect("checked above; lock held");
                entry.lifecycle = TxLifecycle::Solid;
                entry.conflict_ids = vec![current];
                (
                    entry.tx.inputs.clone(),
                    entry.tx.output_ids().collect::<Vec<_>>(),
                )
            };

            for input in &inputs {
                inner.consumers.entry(*input).or_default().insert(current);
            }
            let parent_candidates: Vec<TransactionId> = inputs
                .iter()
                .map(|input| input.transaction_id)
                .filter(|producer| inner.transactions.contains_key(producer))
                .collect();

            for output_id in &output_ids {
                inner.producers.insert(*output_id, current);
            }

            registrations.push(ConflictRegistration {
                tx_id: current,
                inputs,
                parent_candidates,
            });

            // Wake transactions that were waiting for these outputs.
            for output_id in &output_ids {
                let Some(waiting) = inner.waiters.remove(output_id) else {
                    continue;
                };
                for waiter_id in waiting {
                    let Some(output) = synthesize_output(inner, current, *output_id) else {
                        continue;
                    };
                    if let Some(waiter) = inner.transactions.get_mut(&waiter_id) {
                        for (index, input) in waiter.tx.inputs.clone().iter().enumerate() {
                            if input == output_id && waiter.resolved_inputs[index].is_none() {
                                waiter.resolved_inputs[index] = Some(output.clone());
                            }
                        }
                        if waiter.all_inputs_resolved() {
                            worklist.push(waiter_id);
                        }
                    }
                }
            }
        }
    }

    /// Conflict DAG registration, outside the pool lock.
    fn finish_registrations(
        &self,
        registrations: Vec<ConflictRegistration>,
        events: &mut Vec<MempoolEvent>,
    ) {
        for registration in registrations {
            self.conflict_dag.create_conflict(registration.tx_id);

            let parents = self
                .conflict_dag
                .unaccepted_conflicts(&registration.parent_candidates);
            if !parents.is_empty() {
                if let Err(error) = self.conflict_dag.update_conflict_parents(
                    registration.tx_id,
                    &parents,
                    &[],
                ) {
                    tracing::warn!(tx = %registration.tx_id, %error, "conflict parent update failed");
                }
            }
            if let Err(error) = self
                .conflict_dag
                .update_conflicting_resources(registration.tx_id, &registration.inputs)
            {
                tracing::warn!(tx = %registration.tx_id, %error, "conflict resource update failed");
            }

            let mut inner = self.inner.write().expect("pool lock poisoned");
            if let Some(entry) = inner.transactions.get_mut(&registration.tx_id) {
                entry.lifecycle = TxLifecycle::Booked;
            }
            drop(inner);
            events.push(MempoolEvent::TransactionBooked {
                id: registration.tx_id,
            });
        }
    }

    /// Promote an attachment to "included". The transaction's earliest
    /// inclusion becomes the minimum over included attachments.
    pub fn mark_attachment_included(&self, block_id: BlockId) -> Result<(), MempoolError> {
        let mut inner = self.inner.write().expect("pool lock poisoned");
        let tx_id = *inner
            .by_attachment
            .get(&block_id)
            .ok_or(MempoolError::AttachmentNotFound(block_id))?;
        let entry = inner
            .transactions
            .get_mut(&tx_id)
            .ok_or(MempoolError::TransactionNotFound(tx_id))?;
        let slot = *entry
            .attachments
            .get(&block_id)
            .ok_or(MempoolError::AttachmentNotFound(block_id))?;

        entry.included.insert(block_id);
        let candidate = (slot, block_id);
        entry.earliest_included = Some(match entry.earliest_included {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        });
        Ok(())
    }

    /// Flag the transaction accepted (its conflict won).
    pub fn mark_accepted(&self, tx_id: TransactionId) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.write().expect("pool lock poisoned");
            if let Some(entry) = inner.transactions.get_mut(&tx_id) {
                if !entry.accepted {
                    entry.accepted = true;
                    events.push(MempoolEvent::TransactionAccepted { id: tx_id });
                }
            }
        }
        self.emit(events);
    }

    /// Flag the transaction rejected and orphan it (and every pooled
    /// transaction spending its outputs) at `slot`.
    pub fn mark_rejected(&self, tx_id: TransactionId, slot: SlotIndex) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.write().expect("pool lock poisoned");
            if let Some(entry) = inner.transactions.get_mut(&tx_id) {
                if !entry.rejected {
                    entry.rejected = true;
                    events.push(MempoolEvent::TransactionRejected { id: tx_id });
                }
            }
            self.orphan_cascade_locked(&mut inner, tx_id, slot, &mut events);
        }
        self.emit(events);
    }

    /// Flag the transaction committed in `slot`.
    pub fn mark_committed(&self, tx_id: TransactionId, slot: SlotIndex) {
        let mut inner = self.inner.write().expect("pool lock poisoned");
        if let Some(entry) = inner.transactions.get_mut(&tx_id) {
            if entry.committed.is_none() {
                entry.committed = Some(slot);
            }
        }
    }

    /// Orphan `tx_id` at `slot` (latching the oldest orphanage slot) and
    /// cascade through every pooled spender of its outputs.
    fn orphan_cascade_locked(
        &self,
        inner: &mut PoolInner,
        tx_id: TransactionId,
        slot: SlotIndex,
        events: &mut Vec<MempoolEvent>,
    ) {
        let mut queue = vec![tx_id];
        while let Some(current) = queue.pop() {
            let output_ids = {
                let Some(entry) = inner.transactions.get_mut(&current) else {
                    continue;
                };
                if entry.committed.is_some() {
                    continue;
                }
                if entry.orphaned.is_none() {
                    entry.orphaned = Some(slot);
                    events.push(MempoolEvent::TransactionOrphaned { id: current, slot });
                }
                entry.tx.output_ids().collect::<Vec<_>>()
            };
            for output_id in output_ids {
                if let Some(spenders) = inner.consumers.get(&output_id) {
                    queue.extend(spenders.iter().copied());
                }
            }
        }
    }

    /// Snapshot the accepted transactions whose earliest inclusion is in
    /// `slot`, with intra-slot chains compacted away.
    pub fn state_diff(&self, slot: SlotIndex) -> StateDiff {
        let inner = self.inner.read().expect("pool lock poisoned");

        let mut in_slot = BTreeSet::new();
        for (tx_id, entry) in &inner.transactions {
            if entry.accepted
                && !entry.rejected
                && entry.lifecycle == TxLifecycle::Booked
                && entry.earliest_included.map(|(s, _)| s) == Some(slot)
            {
                in_slot.insert(*tx_id);
            }
        }

        let mut diff = StateDiff::new(slot);
        diff.executed_transactions = in_slot.iter().copied().collect();

        for tx_id in &in_slot {
            let entry = &inner.transactions[tx_id];
            let booked_in = entry
                .earliest_included
                .map(|(_, block)| block)
                .unwrap_or(BlockId::ZERO);

            for (index, body) in entry.tx.outputs.iter().enumerate() {
                let output_id = OutputId::new(*tx_id, index as u16);
                let spent_in_slot = inner
                    .consumers
                    .get(&output_id)
                    .is_some_and(|spenders| spenders.iter().any(|s| in_slot.contains(s)));
                if !spent_in_slot {
                    diff.created_states.push(CreatedState {
                        output_id,
                        body: body.clone(),
                        block_id_booked_in: booked_in,
                        creation_time: entry.tx.creation_time,
                    });
                }
            }

            for input in &entry.tx.inputs {
                if in_slot.contains(&input.transaction_id) {
                    continue;
                }
                diff.destroyed_states.push(DestroyedState {
                    output_id: *input,
                    spender: *tx_id,
                });
            }
        }

        diff.created_states.sort_by_key(|state| state.output_id);
        diff.destroyed_states.sort_by_key(|state| state.output_id);
        diff
    }

    /// Evict slot `slot`: drop un-included attachments of that slot, orphan
    /// transactions left without any path to inclusion, and remove
    /// transactions that finished their lifecycle.
    pub fn evict(&self, slot: SlotIndex) {
        let mut events = Vec::new();
        let mut evicted_conflicts = Vec::new();
        {
            let mut guard = self.inner.write().expect("pool lock poisoned");
            let inner: &mut PoolInner = &mut guard;

            let tx_ids: Vec<TransactionId> = inner.transactions.keys().copied().collect();
            let mut to_orphan = Vec::new();
            for tx_id in &tx_ids {
                let entry = inner.transactions.get_mut(tx_id).expect("ids just read");
                if entry.committed.is_some() || entry.orphaned.is_some() {
                    continue;
                }

                let stale: Vec<BlockId> = entry
                    .attachments
                    .iter()
                    .filter(|(block, s)| **s <= slot && !entry.included.contains(block))
                    .map(|(block, _)| *block)
                    .collect();
                for block in &stale {
                    entry.attachments.remove(block);
                }
                if entry.attachments.is_empty() && entry.included.is_empty() {
                    to_orphan.push(*tx_id);
                }
                for block in stale {
                    inner.by_attachment.remove(&block);
                }
            }
            for tx_id in to_orphan {
                self.orphan_cascade_locked(&mut *inner, tx_id, slot, &mut events);
            }

            // Remove transactions whose lifecycle finished at or before the
            // evicted slot. Orphaned transactions linger one eviction cycle
            // so their orphanage stays observable.
            let finished: Vec<TransactionId> = inner
                .transactions
                .iter()
                .filter(|(_, entry)| {
                    let committed_done = entry
                        .committed
                        .is_some_and(|c| c <= slot)
                        && entry.earliest_included.is_some_and(|(s, _)| s <= slot);
                    let orphaned_done = entry.orphaned.is_some_and(|o| o < slot);
                    committed_done || orphaned_done
                })
                .map(|(tx_id, _)| *tx_id)
                .collect();

            for tx_id in finished {
                let Some(entry) = inner.transactions.remove(&tx_id) else {
                    continue;
                };
                for block in entry.attachments.keys() {
                    inner.by_attachment.remove(block);
                }
                for output_id in entry.tx.output_ids() {
                    inner.producers.remove(&output_id);
                    inner.waiters.remove(&output_id);
                }
                for input in &entry.tx.inputs {
                    if let Some(spenders) = inner.consumers.get_mut(input) {
                        spenders.remove(&tx_id);
                        if spenders.is_empty() {
                            inner.consumers.remove(input);
                        }
                    }
                }
                evicted_conflicts.push(tx_id);
                events.push(MempoolEvent::TransactionEvicted { id: tx_id });
            }
        }
        for tx_id in evicted_conflicts {
            self.conflict_dag.evict_conflict(tx_id);
        }
        self.emit(events);
    }

    // ── lookups ──────────────────────────────────────────────────────────

    pub fn transaction_metadata(&self, tx_id: &TransactionId) -> Option<TransactionMetadata> {
        let inner = self.inner.read().expect("pool lock poisoned");
        inner.transactions.get(tx_id).map(TxEntry::snapshot)
    }

    pub fn transaction_metadata_by_attachment(
        &self,
        block_id: &BlockId,
    ) -> Option<TransactionMetadata> {
        let inner = self.inner.read().expect("pool lock poisoned");
        let tx_id = inner.by_attachment.get(block_id)?;
        inner.transactions.get(tx_id).map(TxEntry::snapshot)
    }

    /// Resolve an output reference against the pool first, the committed
    /// ledger second.
    pub fn state_metadata(&self, output_id: OutputId) -> StateMetadata {
        {
            let inner = self.inner.read().expect("pool lock poisoned");
            if let Some(&producer) = inner.producers.get(&output_id) {
                if let Some(entry) = inner.transactions.get(&producer) {
                    if let Some(body) = entry.tx.outputs.get(output_id.index as usize) {
                        return StateMetadata::InPool {
                            output_id,
                            body: body.clone(),
                            producer,
                        };
                    }
                }
            }
        }
        match self.resolver.resolve(output_id).result() {
            Some(Ok(output)) => StateMetadata::Committed(output),
            _ => StateMetadata::Unknown,
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.inner
            .read()
            .expect("pool lock poisoned")
            .transactions
            .len()
    }
}

/// Build the ledger-shaped view of an uncommitted pool output.
fn synthesize_output(
    inner: &PoolInner,
    producer_id: TransactionId,
    output_id: OutputId,
) -> Option<Output> {
    let producer = inner.transactions.get(&producer_id)?;
    let body = producer.tx.outputs.get(output_id.index as usize)?.clone();
    let (block, slot) = producer
        .attachments
        .iter()
        .next()
        .map(|(block, slot)| (*block, *slot))
        .unwrap_or((BlockId::ZERO, SlotIndex::GENESIS));
    Some(Output {
        output_id,
        block_id_booked_in: block,
        slot_booked: SlotIndex::GENESIS,
        slot_created: slot,
        body,
    })
}
