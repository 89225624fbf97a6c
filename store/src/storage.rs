//! Storage facade: permanent and epoch-bucketed prunable namespaces.
//!
//! Layout:
//! - `permanent/settings` — latest commitment, protocol parameters, pruning
//!   cursor.
//! - `permanent/commitments` — commitments keyed by slot.
//! - `prunable/<epoch>/<slot>/<name>` — per-slot buckets (attestations,
//!   account diffs, slot diffs, ...). An epoch's buckets are removed in one
//!   prefix drop when the epoch is pruned.

use crate::error::StoreError;
use crate::kv::KVStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use strata_types::{Commitment, EpochIndex, ProtocolParameters, SlotIndex};

const SETTINGS_NS: &str = "permanent/settings";
const COMMITMENTS_NS: &str = "permanent/commitments";

const KEY_LATEST_COMMITMENT: &[u8] = b"latest_commitment";
const KEY_LAST_PRUNED_EPOCH: &[u8] = b"last_pruned_epoch";
const KEY_PROTOCOL_PARAMETERS: &[u8] = b"protocol_parameters";

/// Outcome of a pruning attempt. None of these are failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PruneOutcome {
    /// The target epoch was already pruned.
    NoPruningNeeded,
    /// Pruning would cut into the retained history window.
    NotEnoughHistory,
    /// All epochs up to and including the contained epoch were dropped.
    EpochPruned(EpochIndex),
}

/// Storage facade shared by one engine.
pub struct Storage {
    kv: Arc<dyn KVStore>,
    slots_per_epoch: u64,
    /// Pruning and slot commit are mutually exclusive.
    pruning_lock: Mutex<()>,
    is_pruning: AtomicBool,
}

impl Storage {
    pub fn new(kv: Arc<dyn KVStore>, slots_per_epoch: u64) -> Self {
        Self {
            kv,
            slots_per_epoch,
            pruning_lock: Mutex::new(()),
            is_pruning: AtomicBool::new(false),
        }
    }

    pub fn kv(&self) -> &Arc<dyn KVStore> {
        &self.kv
    }

    // ── settings ─────────────────────────────────────────────────────────

    /// The latest commitment; the genesis commitment if none was stored yet.
    pub fn latest_commitment(&self) -> Result<Commitment, StoreError> {
        match self.kv.get(SETTINGS_NS, KEY_LATEST_COMMITMENT)? {
            Some(bytes) => {
                bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            None => Ok(Commitment::genesis()),
        }
    }

    pub fn set_latest_commitment(&self, commitment: &Commitment) -> Result<(), StoreError> {
        let bytes = bincode::serialize(commitment)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.kv.put(SETTINGS_NS, KEY_LATEST_COMMITMENT, &bytes)
    }

    pub fn protocol_parameters(&self) -> Result<Option<ProtocolParameters>, StoreError> {
        match self.kv.get(SETTINGS_NS, KEY_PROTOCOL_PARAMETERS)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn set_protocol_parameters(&self, params: &ProtocolParameters) -> Result<(), StoreError> {
        let bytes =
            bincode::serialize(params).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.kv.put(SETTINGS_NS, KEY_PROTOCOL_PARAMETERS, &bytes)
    }

    pub fn last_pruned_epoch(&self) -> Result<Option<EpochIndex>, StoreError> {
        match self.kv.get(SETTINGS_NS, KEY_LAST_PRUNED_EPOCH)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Corruption("pruning cursor width".into()))?;
                Ok(Some(EpochIndex::new(u64::from_le_bytes(arr))))
            }
            None => Ok(None),
        }
    }

    fn set_last_pruned_epoch(&self, epoch: EpochIndex) -> Result<(), StoreError> {
        self.kv.put(
            SETTINGS_NS,
            KEY_LAST_PRUNED_EPOCH,
            &epoch.as_u64().to_le_bytes(),
        )
    }

    // ── commitments ──────────────────────────────────────────────────────

    pub fn store_commitment(&self, commitment: &Commitment) -> Result<(), StoreError> {
        let bytes = bincode::serialize(commitment)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.kv.put(
            COMMITMENTS_NS,
            &commitment.slot.as_u64().to_be_bytes(),
            &bytes,
        )
    }

    pub fn load_commitment(&self, slot: SlotIndex) -> Result<Commitment, StoreError> {
        match self.kv.get(COMMITMENTS_NS, &slot.as_u64().to_be_bytes())? {
            Some(bytes) => {
                bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            None => Err(StoreError::NotFound(format!("commitment for {slot}"))),
        }
    }

    /// Remove all commitments with `slot > target`. Used when rolling an
    /// engine back to a forking point.
    pub fn rollback_commitments(&self, target: SlotIndex) -> Result<(), StoreError> {
        for (key, _) in self.kv.iter_namespace(COMMITMENTS_NS)? {
            let arr: [u8; 8] = match key.as_slice().try_into() {
                Ok(arr) => arr,
                Err(_) => continue,
            };
            let slot = SlotIndex::new(u64::from_be_bytes(arr));
            if slot > target {
                self.kv.delete(COMMITMENTS_NS, &key)?;
            }
        }
        let latest = match self.load_commitment(target) {
            Ok(commitment) => commitment,
            Err(StoreError::NotFound(_)) if target == SlotIndex::GENESIS => Commitment::genesis(),
            Err(error) => return Err(error),
        };
        self.set_latest_commitment(&latest)
    }

    // ── prunable buckets ─────────────────────────────────────────────────

    fn prunable_namespace(&self, slot: SlotIndex, name: &str) -> String {
        let epoch = slot.epoch(self.slots_per_epoch);
        format!("prunable/{}/{}/{}", epoch.as_u64(), slot.as_u64(), name)
    }

    fn check_not_pruned(&self, slot: SlotIndex) -> Result<(), StoreError> {
        if let Some(pruned) = self.last_pruned_epoch()? {
            if slot.epoch(self.slots_per_epoch) <= pruned {
                return Err(StoreError::EpochPruned(slot.epoch(self.slots_per_epoch)));
            }
        }
        Ok(())
    }

    pub fn put_prunable(
        &self,
        slot: SlotIndex,
        name: &str,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StoreError> {
        self.check_not_pruned(slot)?;
        self.kv.put(&self.prunable_namespace(slot, name), key, value)
    }

    pub fn get_prunable(
        &self,
        slot: SlotIndex,
        name: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_not_pruned(slot)?;
        self.kv.get(&self.prunable_namespace(slot, name), key)
    }

    pub fn delete_prunable(
        &self,
        slot: SlotIndex,
        name: &str,
        key: &[u8],
    ) -> Result<(), StoreError> {
        self.check_not_pruned(slot)?;
        self.kv.delete(&self.prunable_namespace(slot, name), key)
    }

    pub fn iter_prunable(
        &self,
        slot: SlotIndex,
        name: &str,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.check_not_pruned(slot)?;
        self.kv.iter_namespace(&self.prunable_namespace(slot, name))
    }

    // ── pruning ──────────────────────────────────────────────────────────

    /// Whether a pruning pass is currently running.
    pub fn is_pruning(&self) -> bool {
        self.is_pruning.load(Ordering::Relaxed)
    }

    /// Drop all prunable buckets for epochs `<= target`, keeping at least
    /// `min_retained_epochs` full epochs below `latest_epoch`.
    pub fn prune_until(
        &self,
        target: EpochIndex,
        latest_epoch: EpochIndex,
        min_retained_epochs: u64,
    ) -> Result<PruneOutcome, StoreError> {
        let _guard = self.pruning_lock.lock().expect("pruning lock poisoned");
        self.is_pruning.store(true, Ordering::Relaxed);
        let outcome = self.prune_until_locked(target, latest_epoch, min_retained_epochs);
        self.is_pruning.store(false, Ordering::Relaxed);
        outcome
    }

    fn prune_until_locked(
        &self,
        target: EpochIndex,
        latest_epoch: EpochIndex,
        min_retained_epochs: u64,
    ) -> Result<PruneOutcome, StoreError> {
        let last_pruned = self.last_pruned_epoch()?;
        if let Some(pruned) = last_pruned {
            if target <= pruned {
                return Ok(PruneOutcome::NoPruningNeeded);
            }
        }

        if target.as_u64() + min_retained_epochs >= latest_epoch.as_u64() {
            return Ok(PruneOutcome::NotEnoughHistory);
        }

        let start = last_pruned.map_or(0, |e| e.as_u64() + 1);
        for epoch in start..=target.as_u64() {
            let dropped = self
                .kv
                .drop_namespace_prefix(&format!("prunable/{epoch}/"))?;
            tracing::debug!(epoch, dropped, "pruned epoch bucket");
        }
        self.set_last_pruned_epoch(target)?;

        Ok(PruneOutcome::EpochPruned(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use strata_types::CommitmentId;

    fn storage() -> Storage {
        Storage::new(Arc::new(MemoryStore::new()), 8)
    }

    fn commitment(slot: u64) -> Commitment {
        Commitment {
            slot: SlotIndex::new(slot),
            prev_id: CommitmentId::new([slot as u8; 32]),
            roots_id: [0u8; 32],
            cumulative_weight: slot,
        }
    }

    // ── settings ─────────────────────────────────────────────────────────

    #[test]
    fn latest_commitment_defaults_to_genesis() {
        let storage = storage();
        assert_eq!(storage.latest_commitment().unwrap(), Commitment::genesis());
    }

    #[test]
    fn latest_commitment_roundtrip() {
        let storage = storage();
        let c = commitment(5);
        storage.set_latest_commitment(&c).unwrap();
        assert_eq!(storage.latest_commitment().unwrap(), c);
    }

    #[test]
    fn protocol_parameters_roundtrip() {
        let storage = storage();
        assert!(storage.protocol_parameters().unwrap().is_none());
        let params = ProtocolParameters::default();
        storage.set_protocol_parameters(&params).unwrap();
        assert_eq!(
            storage.protocol_parameters().unwrap().unwrap().slots_per_epoch,
            params.slots_per_epoch
        );
    }

    // ── commitments ──────────────────────────────────────────────────────

    #[test]
    fn commitment_store_and_load() {
        let storage = storage();
        let c = commitment(3);
        storage.store_commitment(&c).unwrap();
        assert_eq!(storage.load_commitment(SlotIndex::new(3)).unwrap(), c);
        assert!(matches!(
            storage.load_commitment(SlotIndex::new(4)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn rollback_commitments_drops_newer_slots() {
        let storage = storage();
        for slot in 1..=5 {
            storage.store_commitment(&commitment(slot)).unwrap();
        }
        storage.set_latest_commitment(&commitment(5)).unwrap();

        storage.rollback_commitments(SlotIndex::new(3)).unwrap();

        assert_eq!(storage.latest_commitment().unwrap(), commitment(3));
        assert!(storage.load_commitment(SlotIndex::new(4)).is_err());
        assert!(storage.load_commitment(SlotIndex::new(3)).is_ok());
    }

    // ── prunable buckets ─────────────────────────────────────────────────

    #[test]
    fn prunable_bucket_roundtrip() {
        let storage = storage();
        let slot = SlotIndex::new(10);
        storage.put_prunable(slot, "attestations", b"k", b"v").unwrap();
        assert_eq!(
            storage.get_prunable(slot, "attestations", b"k").unwrap(),
            Some(b"v".to_vec())
        );
        assert_eq!(
            storage.iter_prunable(slot, "attestations").unwrap().len(),
            1
        );
    }

    #[test]
    fn pruned_epoch_access_is_rejected() {
        let storage = storage();
        // slots_per_epoch = 8, so slot 4 is in epoch 0.
        storage.put_prunable(SlotIndex::new(4), "roots", b"k", b"v").unwrap();

        let outcome = storage
            .prune_until(EpochIndex::new(0), EpochIndex::new(5), 1)
            .unwrap();
        assert_eq!(outcome, PruneOutcome::EpochPruned(EpochIndex::new(0)));

        assert!(matches!(
            storage.get_prunable(SlotIndex::new(4), "roots", b"k"),
            Err(StoreError::EpochPruned(_))
        ));
        // Later epochs are unaffected.
        assert!(storage.get_prunable(SlotIndex::new(16), "roots", b"k").is_ok());
    }

    #[test]
    fn prune_outcomes() {
        let storage = storage();

        // Not enough history below the latest epoch.
        assert_eq!(
            storage
                .prune_until(EpochIndex::new(3), EpochIndex::new(4), 1)
                .unwrap(),
            PruneOutcome::NotEnoughHistory
        );

        assert_eq!(
            storage
                .prune_until(EpochIndex::new(1), EpochIndex::new(5), 1)
                .unwrap(),
            PruneOutcome::EpochPruned(EpochIndex::new(1))
        );

        // Same target again: nothing left to do.
        assert_eq!(
            storage
                .prune_until(EpochIndex::new(1), EpochIndex::new(5), 1)
                .unwrap(),
            PruneOutcome::NoPruningNeeded
        );
    }

    #[test]
    fn pruning_drops_all_epochs_up_to_target() {
        let storage = storage();
        storage.put_prunable(SlotIndex::new(2), "b", b"k", b"v").unwrap(); // epoch 0
        storage.put_prunable(SlotIndex::new(9), "b", b"k", b"v").unwrap(); // epoch 1
        storage.put_prunable(SlotIndex::new(17), "b", b"k", b"v").unwrap(); // epoch 2

        storage
            .prune_until(EpochIndex::new(1), EpochIndex::new(10), 1)
            .unwrap();

        assert!(storage.get_prunable(SlotIndex::new(2), "b", b"k").is_err());
        assert!(storage.get_prunable(SlotIndex::new(9), "b", b"k").is_err());
        assert_eq!(
            storage.get_prunable(SlotIndex::new(17), "b", b"k").unwrap(),
            Some(b"v".to_vec())
        );
    }
}
