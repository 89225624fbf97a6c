//! Block acceptance gadget.
//!
//! Every booked block witnesses its past cone with its issuer's seat. A
//! block is accepted once the witnessing weight reaches the committee's
//! acceptance threshold, and confirmed at the confirmation threshold once
//! its ancestry is accepted. Accepted issuing times drive notarization.

use crate::committee::Committee;
use crate::error::ConsensusError;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use strata_conflict::WeightProvider;
use strata_ledger::tree::merkle_root;
use strata_types::{Block, BlockId, SeatIndex, SlotIndex, Timestamp, TransactionId};

/// Mutable per-block state tracked by the engine.
#[derive(Clone, Debug)]
pub struct BlockMetadata {
    pub block: Block,
    pub is_solid: bool,
    pub is_booked: bool,
    pub is_invalid: bool,
    pub payload_conflict_ids: Vec<TransactionId>,
    pub conflict_ids: Vec<TransactionId>,
    pub accepted: bool,
    pub confirmed: bool,
    pub ratified_accepted: bool,
    pub witness_seats: BTreeSet<SeatIndex>,
}

impl BlockMetadata {
    fn new(block: Block) -> Self {
        Self {
            block,
            is_solid: false,
            is_booked: false,
            is_invalid: false,
            payload_conflict_ids: Vec::new(),
            conflict_ids: Vec::new(),
            accepted: false,
            confirmed: false,
            ratified_accepted: false,
            witness_seats: BTreeSet::new(),
        }
    }

    /// Combined weight of the seats witnessing this block.
    pub fn witness_weight(&self, committee: &Committee) -> u64 {
        self.witness_seats
            .iter()
            .map(|seat| committee.seat_weight(*seat))
            .sum()
    }
}

/// Flag transitions surfaced to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GadgetEvent {
    BlockAccepted(BlockId),
    BlockConfirmed(BlockId),
}

struct GadgetInner {
    blocks: HashMap<BlockId, BlockMetadata>,
    accepted_by_slot: BTreeMap<SlotIndex, BTreeSet<BlockId>>,
    latest_accepted_time: Timestamp,
    latest_confirmed_time: Timestamp,
    latest_accepted_slot: SlotIndex,
}

/// The acceptance gadget doubles as the engine's block cache: blocks enter on
/// receipt and leave when their slot is evicted after commit.
pub struct AcceptanceGadget {
    committee: Arc<Committee>,
    inner: RwLock<GadgetInner>,
}

impl AcceptanceGadget {
    pub fn new(committee: Arc<Committee>) -> Self {
        Self {
            committee,
            inner: RwLock::new(GadgetInner {
                blocks: HashMap::new(),
                accepted_by_slot: BTreeMap::new(),
                latest_accepted_time: Timestamp::EPOCH,
                latest_confirmed_time: Timestamp::EPOCH,
                latest_accepted_slot: SlotIndex::GENESIS,
            }),
        }
    }

    /// Insert a received block. Returns false if it was already known.
    pub fn insert_block(&self, block: Block) -> bool {
        let mut inner = self.inner.write().expect("gadget lock poisoned");
        if inner.blocks.contains_key(&block.id) {
            return false;
        }
        inner.blocks.insert(block.id, BlockMetadata::new(block));
        true
    }

    pub fn block(&self, id: &BlockId) -> Option<BlockMetadata> {
        let inner = self.inner.read().expect("gadget lock poisoned");
        inner.blocks.get(id).cloned()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        let inner = self.inner.read().expect("gadget lock poisoned");
        inner.blocks.contains_key(id)
    }

    pub fn mark_solid(&self, id: &BlockId) {
        let mut inner = self.inner.write().expect("gadget lock poisoned");
        if let Some(meta) = inner.blocks.get_mut(id) {
            meta.is_solid = true;
        }
    }

    pub fn mark_invalid(&self, id: &BlockId) {
        let mut inner = self.inner.write().expect("gadget lock poisoned");
        if let Some(meta) = inner.blocks.get_mut(id) {
            meta.is_invalid = true;
        }
    }

    /// Record booking results: the block's own payload conflicts and the
    /// conflicts inherited from its parents.
    pub fn mark_booked(
        &self,
        id: &BlockId,
        payload_conflict_ids: Vec<TransactionId>,
        conflict_ids: Vec<TransactionId>,
    ) {
        let mut inner = self.inner.write().expect("gadget lock poisoned");
        if let Some(meta) = inner.blocks.get_mut(id) {
            meta.is_booked = true;
            meta.payload_conflict_ids = payload_conflict_ids;
            meta.conflict_ids = conflict_ids;
        }
    }

    /// Witness the block's past cone with the issuer's seat and propagate
    /// acceptance/confirmation. Returns the flag transitions in past-first
    /// order.
    pub fn process_booked_block(&self, id: &BlockId) -> Result<Vec<GadgetEvent>, ConsensusError> {
        let mut inner = self.inner.write().expect("gadget lock poisoned");

        let issuer = match inner.blocks.get(id) {
            Some(meta) => meta.block.issuer_id,
            None => return Ok(Vec::new()),
        };
        let Some(seat) = self.committee.seat(&issuer) else {
            // Blocks from non-committee issuers carry no witness weight.
            return Ok(Vec::new());
        };

        // Walk the past cone over strong parents, stopping at blocks this
        // seat has already witnessed.
        let mut stack = vec![*id];
        let mut touched = Vec::new();
        while let Some(current) = stack.pop() {
            let Some(meta) = inner.blocks.get_mut(&current) else {
                continue;
            };
            if !meta.witness_seats.insert(seat) {
                continue;
            }
            touched.push(current);
            stack.extend(meta.block.strong_parents.iter().copied());
        }

        // Acceptance in past-first order so parents flip before children.
        touched.reverse();
        let mut events = Vec::new();
        for block_id in touched {
            self.try_advance(&mut inner, block_id, &mut events);
        }
        Ok(events)
    }

    fn try_advance(&self, inner: &mut GadgetInner, id: BlockId, events: &mut Vec<GadgetEvent>) {
        let Some(meta) = inner.blocks.get(&id) else {
            return;
        };
        let weight = meta.witness_weight(&self.committee);
        let issuing_time = meta.block.issuing_time;
        let slot = meta.block.slot;

        if !meta.accepted && weight >= self.committee.accept_threshold() {
            if let Some(meta) = inner.blocks.get_mut(&id) {
                meta.accepted = true;
            }
            inner.accepted_by_slot.entry(slot).or_default().insert(id);
            if issuing_time > inner.latest_accepted_time {
                inner.latest_accepted_time = issuing_time;
            }
            if slot > inner.latest_accepted_slot {
                inner.latest_accepted_slot = slot;
            }
            events.push(GadgetEvent::BlockAccepted(id));
        }

        let meta = inner
            .blocks
            .get(&id)
            .expect("present above; lock held throughout");
        if !meta.confirmed && meta.accepted && weight >= self.committee.confirm_threshold() {
            let ancestors_accepted = meta.block.strong_parents.iter().all(|parent| {
                inner
                    .blocks
                    .get(parent)
                    .map_or(true, |parent_meta| parent_meta.accepted)
            });
            if ancestors_accepted {
                if let Some(meta) = inner.blocks.get_mut(&id) {
                    meta.confirmed = true;
                }
                if issuing_time > inner.latest_confirmed_time {
                    inner.latest_confirmed_time = issuing_time;
                }
                events.push(GadgetEvent::BlockConfirmed(id));
            }
        }
    }

    pub fn latest_accepted_time(&self) -> Timestamp {
        self.inner
            .read()
            .expect("gadget lock poisoned")
            .latest_accepted_time
    }

    pub fn latest_confirmed_time(&self) -> Timestamp {
        self.inner
            .read()
            .expect("gadget lock poisoned")
            .latest_confirmed_time
    }

    pub fn latest_accepted_slot(&self) -> SlotIndex {
        self.inner
            .read()
            .expect("gadget lock poisoned")
            .latest_accepted_slot
    }

    /// The accepted blocks of a slot, in ID order.
    pub fn accepted_blocks(&self, slot: SlotIndex) -> Vec<BlockId> {
        let inner = self.inner.read().expect("gadget lock poisoned");
        inner
            .accepted_by_slot
            .get(&slot)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Merkle root over the slot's accepted block IDs.
    pub fn accepted_blocks_root(&self, slot: SlotIndex) -> [u8; 32] {
        let hashes: Vec<[u8; 32]> = self
            .accepted_blocks(slot)
            .iter()
            .map(|id| *id.as_bytes())
            .collect();
        merkle_root(&hashes)
    }

    /// Seal acceptance for every block up to `slot`: accepted blocks become
    /// ratified-accepted. Called by notarization when the slot is committed.
    pub fn ratify_until(&self, slot: SlotIndex) {
        let mut inner = self.inner.write().expect("gadget lock poisoned");
        for meta in inner.blocks.values_mut() {
            if meta.accepted && meta.block.slot <= slot {
                meta.ratified_accepted = true;
            }
        }
    }

    /// Drop all blocks of slots `<= slot` from the cache. Returns the evicted
    /// block IDs.
    pub fn evict_slot(&self, slot: SlotIndex) -> Vec<BlockId> {
        let mut inner = self.inner.write().expect("gadget lock poisoned");
        let evicted: Vec<BlockId> = inner
            .blocks
            .iter()
            .filter(|(_, meta)| meta.block.slot <= slot)
            .map(|(id, _)| *id)
            .collect();
        for id in &evicted {
            inner.blocks.remove(id);
        }
        inner.accepted_by_slot.retain(|s, _| *s > slot);
        evicted
    }

    pub fn block_count(&self) -> usize {
        self.inner.read().expect("gadget lock poisoned").blocks.len()
    }
}
