//! Attestation manager.
//!
//! Committee members attest to the commitment they observed by issuing
//! blocks. The manager keeps a sliding window of the last `W` slots in
//! memory; on commit, the window's deterministic attestation set is flushed
//! to per-slot storage and converted into the commitment's cumulative-weight
//! delta. Export/import is bit-exact:
//! `slot_count:u64 ( slot_index:u64 { att_count:u64 att* } )*`.

use crate::committee::Committee;
use crate::error::ConsensusError;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::{Arc, RwLock};
use strata_ledger::tree::merkle_root;
use strata_store::Storage;
use strata_types::{AccountId, Attestation, Block, SlotIndex};

const ATTESTATIONS_BUCKET: &str = "attestations";

struct AttestationsInner {
    /// Latest attestation per committee member, not yet bound to a slot.
    latest_per_issuer: HashMap<AccountId, Attestation>,
    /// Committed attestation sets for the most recent `W` slots.
    committed_window: BTreeMap<SlotIndex, BTreeMap<AccountId, Attestation>>,
    last_committed: SlotIndex,
}

/// Sliding-window attestation tracker for one engine.
pub struct AttestationManager {
    committee: Arc<Committee>,
    storage: Arc<Storage>,
    /// Window width `W` in slots.
    window: u64,
    inner: RwLock<AttestationsInner>,
}

impl AttestationManager {
    pub fn new(committee: Arc<Committee>, storage: Arc<Storage>, window: u64) -> Self {
        Self {
            committee,
            storage,
            window,
            inner: RwLock::new(AttestationsInner {
                latest_per_issuer: HashMap::new(),
                committed_window: BTreeMap::new(),
                last_committed: SlotIndex::GENESIS,
            }),
        }
    }

    pub fn last_committed_slot(&self) -> SlotIndex {
        self.inner
            .read()
            .expect("attestations lock poisoned")
            .last_committed
    }

    /// Record the attestation a block implies. Ignored for non-committee
    /// issuers, for commitments older than the window, and when a newer
    /// attestation from the same issuer is already tracked.
    pub fn add_attestation_from_block(&self, block: &Block) {
        if self.committee.seat(&block.issuer_id).is_none() {
            return;
        }
        let attestation = Attestation::from_block(block);

        let mut inner = self.inner.write().expect("attestations lock poisoned");
        let cutoff = inner.last_committed.saturating_sub(self.window);
        if attestation.commitment_slot < cutoff {
            return;
        }
        match inner.latest_per_issuer.get(&block.issuer_id) {
            Some(existing) if existing.issuing_time >= attestation.issuing_time => {}
            _ => {
                inner.latest_per_issuer.insert(block.issuer_id, attestation);
            }
        }
    }

    /// Seal the attestation set of `slot`: flush it to per-slot storage and
    /// return the cumulative-weight delta and the attestations root.
    pub fn commit(&self, slot: SlotIndex) -> Result<(u64, [u8; 32]), ConsensusError> {
        let mut inner = self.inner.write().expect("attestations lock poisoned");
        if slot != inner.last_committed.next() {
            return Err(ConsensusError::CommitGap {
                expected: inner.last_committed.next(),
                got: slot,
            });
        }

        // The deterministic set for this slot: each member's latest
        // attestation whose observed commitment is still within the window.
        let cutoff = slot.saturating_sub(self.window);
        let mut selected = BTreeMap::new();
        for (issuer, attestation) in &inner.latest_per_issuer {
            if attestation.commitment_slot >= cutoff && attestation.commitment_slot < slot {
                selected.insert(*issuer, *attestation);
            }
        }

        for (issuer, attestation) in &selected {
            self.storage.put_prunable(
                slot,
                ATTESTATIONS_BUCKET,
                issuer.as_bytes(),
                &attestation.to_bytes(),
            )?;
        }

        let weight_delta: u64 = selected
            .keys()
            .map(|issuer| self.committee.weight_of_account(issuer))
            .sum();
        let root = attestations_root(&selected);

        inner.committed_window.insert(slot, selected);
        let window_floor = slot.saturating_sub(self.window);
        inner.committed_window.retain(|s, _| *s >= window_floor);
        inner.last_committed = slot;

        Ok((weight_delta, root))
    }

    /// The sealed attestation set of a committed slot: from the in-memory
    /// window when recent, from per-slot storage otherwise.
    pub fn attestations(
        &self,
        slot: SlotIndex,
    ) -> Result<BTreeMap<AccountId, Attestation>, ConsensusError> {
        let inner = self.inner.read().expect("attestations lock poisoned");
        if let Some(set) = inner.committed_window.get(&slot) {
            return Ok(set.clone());
        }
        let mut out = BTreeMap::new();
        for (key, value) in self.storage.iter_prunable(slot, ATTESTATIONS_BUCKET)? {
            let arr: [u8; 32] = key
                .as_slice()
                .try_into()
                .map_err(|_| ConsensusError::SnapshotFormat("attestation key width".into()))?;
            let attestation = Attestation::from_bytes(&value)
                .map_err(|e| ConsensusError::SnapshotFormat(e.to_string()))?;
            out.insert(AccountId::new(arr), attestation);
        }
        Ok(out)
    }

    /// Reset to `slot` when rolling an engine back to a forking point.
    pub fn rollback(&self, slot: SlotIndex) {
        let mut inner = self.inner.write().expect("attestations lock poisoned");
        inner.committed_window.retain(|s, _| *s <= slot);
        inner.last_committed = slot;
    }

    /// Bit-exact export of the last `W + 1` sealed slots up to `target`.
    pub fn export<W2: Write>(
        &self,
        writer: &mut W2,
        target: SlotIndex,
    ) -> Result<(), ConsensusError> {
        let last_committed = self.last_committed_slot();
        if target > last_committed {
            return Err(ConsensusError::ExportTargetTooNew {
                target,
                committed: last_committed,
            });
        }

        let start = target.saturating_sub(self.window);
        let slot_count = target - start + 1;
        write_u64(writer, slot_count)?;

        let mut slot = start;
        while slot <= target {
            let attestations = self.attestations(slot)?;
            write_u64(writer, slot.as_u64())?;
            write_u64(writer, attestations.len() as u64)?;
            for attestation in attestations.values() {
                writer
                    .write_all(&attestation.to_bytes())
                    .map_err(|e| ConsensusError::SnapshotFormat(e.to_string()))?;
            }
            slot = slot.next();
        }
        Ok(())
    }

    /// Inverse of [`AttestationManager::export`]. Restores the committed
    /// window and per-slot storage.
    pub fn import<R: Read>(&self, reader: &mut R) -> Result<(), ConsensusError> {
        let slot_count = read_u64(reader)?;
        let mut last_slot = SlotIndex::GENESIS;

        for _ in 0..slot_count {
            let slot = SlotIndex::new(read_u64(reader)?);
            let att_count = read_u64(reader)?;
            let mut set = BTreeMap::new();
            for _ in 0..att_count {
                let mut bytes = [0u8; Attestation::LENGTH];
                reader
                    .read_exact(&mut bytes)
                    .map_err(|e| ConsensusError::SnapshotFormat(e.to_string()))?;
                let attestation = Attestation::from_bytes(&bytes)
                    .map_err(|e| ConsensusError::SnapshotFormat(e.to_string()))?;
                set.insert(attestation.issuer_id, attestation);
            }

            for (issuer, attestation) in &set {
                self.storage.put_prunable(
                    slot,
                    ATTESTATIONS_BUCKET,
                    issuer.as_bytes(),
                    &attestation.to_bytes(),
                )?;
            }
            let mut inner = self.inner.write().expect("attestations lock poisoned");
            inner.committed_window.insert(slot, set);
            last_slot = slot;
        }

        let mut inner = self.inner.write().expect("attestations lock poisoned");
        inner.last_committed = last_slot;
        let window_floor = last_slot.saturating_sub(self.window);
        inner.committed_window.retain(|s, _| *s >= window_floor);
        Ok(())
    }
}

/// Merkle root over `AccountId -> Attestation` in key order.
pub fn attestations_root(attestations: &BTreeMap<AccountId, Attestation>) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = attestations
        .iter()
        .map(|(issuer, attestation)| {
            let mut hasher = Blake2b::<U32>::new();
            hasher.update(issuer.as_bytes());
            hasher.update(attestation.to_bytes());
            let digest = hasher.finalize();
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            out
        })
        .collect();
    merkle_root(&leaves)
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), ConsensusError> {
    writer
        .write_all(&value.to_le_bytes())
        .map_err(|e| ConsensusError::SnapshotFormat(e.to_string()))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, ConsensusError> {
    let mut bytes = [0u8; 8];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| ConsensusError::SnapshotFormat(e.to_string()))?;
    Ok(u64::from_le_bytes(bytes))
}
