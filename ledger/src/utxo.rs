//! UTXO ledger: outputs, spends, unspent index and per-slot diffs.
//!
//! All mutation happens through [`UtxoLedger::apply_diff`] and
//! [`UtxoLedger::rollback_diff`], each an atomic batch against the backing
//! store. A single reader-writer lock guards the in-memory state tree and
//! the ledger index; readers never block each other.

use crate::error::LedgerError;
use crate::tree::StateTree;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use strata_store::{Storage, StoreError, WriteOp};
use strata_types::{Output, OutputId, SlotIndex, TransactionId};

const OUTPUTS_NS: &str = "ledger/outputs";
const UNSPENT_NS: &str = "ledger/unspent";
const SPENTS_NS: &str = "ledger/spents";
const META_NS: &str = "ledger/meta";
const KEY_LEDGER_INDEX: &[u8] = b"ledger_index";
const SLOT_DIFF_BUCKET: &str = "slot-diff";
const KEY_DIFF: &[u8] = b"diff";

/// A consumed output: who spent it and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spent {
    pub output_id: OutputId,
    pub transaction_id: TransactionId,
    pub slot_spent: SlotIndex,
}

/// Net UTXO changes of one committed slot, persisted for rollback.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDiff {
    pub created: Vec<OutputId>,
    pub consumed: Vec<Spent>,
}

struct UtxoInner {
    state_tree: StateTree,
    ledger_index: SlotIndex,
}

/// The UTXO ledger.
pub struct UtxoLedger {
    storage: Arc<Storage>,
    inner: RwLock<UtxoInner>,
}

impl UtxoLedger {
    /// Open the ledger, rebuilding the state tree from the unspent index.
    pub fn new(storage: Arc<Storage>) -> Result<Self, LedgerError> {
        let mut state_tree = StateTree::new();
        for (key, _) in storage.kv().iter_namespace(UNSPENT_NS)? {
            let bytes = storage
                .kv()
                .get(OUTPUTS_NS, &key)?
                .ok_or(StoreError::Corruption("unspent entry without output".into()))?;
            let output: Output = bincode::deserialize(&bytes)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            state_tree.insert(key, output.state_hash());
        }

        let ledger_index = match storage.kv().get(META_NS, KEY_LEDGER_INDEX)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Corruption("ledger index width".into()))?;
                SlotIndex::new(u64::from_le_bytes(arr))
            }
            None => SlotIndex::GENESIS,
        };

        Ok(Self {
            storage,
            inner: RwLock::new(UtxoInner {
                state_tree,
                ledger_index,
            }),
        })
    }

    /// The latest slot whose diff has been applied.
    pub fn ledger_index(&self) -> SlotIndex {
        self.inner.read().expect("utxo lock poisoned").ledger_index
    }

    /// Force the ledger index. Only used when seeding from a snapshot.
    pub fn set_ledger_index(&self, slot: SlotIndex) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("utxo lock poisoned");
        inner.ledger_index = slot;
        self.storage
            .kv()
            .put(META_NS, KEY_LEDGER_INDEX, &slot.as_u64().to_le_bytes())?;
        Ok(())
    }

    /// Root of the unspent-state tree.
    pub fn state_tree_root(&self) -> [u8; 32] {
        self.inner
            .read()
            .expect("utxo lock poisoned")
            .state_tree
            .root()
    }

    /// Seed an unspent output outside the slot-commit path (genesis or
    /// snapshot import).
    pub fn add_unspent_output(&self, output: &Output) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("utxo lock poisoned");
        let key = output.output_id.to_bytes().to_vec();
        let bytes =
            bincode::serialize(output).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        self.storage.kv().batch(vec![
            WriteOp::Put {
                namespace: OUTPUTS_NS.into(),
                key: key.clone(),
                value: bytes,
            },
            WriteOp::Put {
                namespace: UNSPENT_NS.into(),
                key: key.clone(),
                value: vec![],
            },
        ])?;
        inner.state_tree.insert(key, output.state_hash());
        Ok(())
    }

    /// Apply one slot's created and consumed outputs as a single batch.
    /// `slot` must directly follow the current ledger index.
    pub fn apply_diff(
        &self,
        slot: SlotIndex,
        created: &[Output],
        consumed: &[Spent],
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("utxo lock poisoned");
        if slot != inner.ledger_index.next() {
            return Err(LedgerError::CommitGap {
                expected: inner.ledger_index.next(),
                got: slot,
            });
        }

        let mut ops = Vec::with_capacity(created.len() * 2 + consumed.len() * 2);
        for spent in consumed {
            let key = spent.output_id.to_bytes().to_vec();
            ops.push(WriteOp::Delete {
                namespace: UNSPENT_NS.into(),
                key: key.clone(),
            });
            ops.push(WriteOp::Put {
                namespace: SPENTS_NS.into(),
                key,
                value: bincode::serialize(spent)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            });
        }
        for output in created {
            let key = output.output_id.to_bytes().to_vec();
            ops.push(WriteOp::Put {
                namespace: OUTPUTS_NS.into(),
                key: key.clone(),
                value: bincode::serialize(output)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            });
            ops.push(WriteOp::Put {
                namespace: UNSPENT_NS.into(),
                key,
                value: vec![],
            });
        }
        self.storage.kv().batch(ops)?;

        let diff = SlotDiff {
            created: created.iter().map(|output| output.output_id).collect(),
            consumed: consumed.to_vec(),
        };
        self.storage.put_prunable(
            slot,
            SLOT_DIFF_BUCKET,
            KEY_DIFF,
            &bincode::serialize(&diff).map_err(|e| LedgerError::Serialization(e.to_string()))?,
        )?;

        for spent in consumed {
            inner.state_tree.remove(&spent.output_id.to_bytes());
        }
        for output in created {
            inner
                .state_tree
                .insert(output.output_id.to_bytes().to_vec(), output.state_hash());
        }
        inner.ledger_index = slot;
        self.storage
            .kv()
            .put(META_NS, KEY_LEDGER_INDEX, &slot.as_u64().to_le_bytes())?;

        Ok(())
    }

    /// Undo the topmost applied slot diff. Used when rolling an engine back
    /// to a forking point.
    pub fn rollback_diff(&self, slot: SlotIndex) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().expect("utxo lock poisoned");
        if slot != inner.ledger_index {
            return Err(LedgerError::CommitGap {
                expected: inner.ledger_index,
                got: slot,
            });
        }

        let diff = self.slot_diff(slot)?;

        let mut ops = Vec::with_capacity(diff.created.len() * 2 + diff.consumed.len() * 2);
        for output_id in &diff.created {
            let key = output_id.to_bytes().to_vec();
            ops.push(WriteOp::Delete {
                namespace: UNSPENT_NS.into(),
                key: key.clone(),
            });
            ops.push(WriteOp::Delete {
                namespace: OUTPUTS_NS.into(),
                key,
            });
        }
        for spent in &diff.consumed {
            let key = spent.output_id.to_bytes().to_vec();
            ops.push(WriteOp::Delete {
                namespace: SPENTS_NS.into(),
                key: key.clone(),
            });
            ops.push(WriteOp::Put {
                namespace: UNSPENT_NS.into(),
                key,
                value: vec![],
            });
        }
        self.storage.kv().batch(ops)?;
        self.storage.delete_prunable(slot, SLOT_DIFF_BUCKET, KEY_DIFF)?;

        for output_id in &diff.created {
            inner.state_tree.remove(&output_id.to_bytes());
        }
        for spent in &diff.consumed {
            let output = self
                .read_output(spent.output_id)?
                .ok_or(LedgerError::OutputNotFound(spent.output_id))?;
            inner
                .state_tree
                .insert(spent.output_id.to_bytes().to_vec(), output.state_hash());
        }

        inner.ledger_index = slot.prev();
        self.storage.kv().put(
            META_NS,
            KEY_LEDGER_INDEX,
            &inner.ledger_index.as_u64().to_le_bytes(),
        )?;

        Ok(())
    }

    /// Delete spent-output records up to and including `slot`, preserving
    /// unspent outputs. Slot diffs live in prunable epoch buckets and are
    /// dropped with their epoch.
    pub fn prune_spents_until(&self, slot: SlotIndex) -> Result<usize, LedgerError> {
        let _guard = self.inner.write().expect("utxo lock poisoned");
        let mut pruned = 0;
        for (key, value) in self.storage.kv().iter_namespace(SPENTS_NS)? {
            let spent: Spent = bincode::deserialize(&value)
                .map_err(|e| LedgerError::Serialization(e.to_string()))?;
            if spent.slot_spent <= slot {
                self.storage.kv().batch(vec![
                    WriteOp::Delete {
                        namespace: SPENTS_NS.into(),
                        key: key.clone(),
                    },
                    WriteOp::Delete {
                        namespace: OUTPUTS_NS.into(),
                        key,
                    },
                ])?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn read_output(&self, output_id: OutputId) -> Result<Option<Output>, LedgerError> {
        match self.storage.kv().get(OUTPUTS_NS, &output_id.to_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Look up an output regardless of spent status.
    pub fn output(&self, output_id: OutputId) -> Result<Option<Output>, LedgerError> {
        let _guard = self.inner.read().expect("utxo lock poisoned");
        self.read_output(output_id)
    }

    pub fn is_unspent(&self, output_id: OutputId) -> Result<bool, LedgerError> {
        let _guard = self.inner.read().expect("utxo lock poisoned");
        Ok(self
            .storage
            .kv()
            .contains(UNSPENT_NS, &output_id.to_bytes())?)
    }

    pub fn spent(&self, output_id: OutputId) -> Result<Option<Spent>, LedgerError> {
        let _guard = self.inner.read().expect("utxo lock poisoned");
        match self.storage.kv().get(SPENTS_NS, &output_id.to_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// The persisted diff of a committed slot.
    pub fn slot_diff(&self, slot: SlotIndex) -> Result<SlotDiff, LedgerError> {
        match self.storage.get_prunable(slot, SLOT_DIFF_BUCKET, KEY_DIFF)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| LedgerError::Serialization(e.to_string())),
            None => Ok(SlotDiff::default()),
        }
    }

    /// All unspent outputs in key order. Used by snapshot export.
    pub fn unspent_outputs(&self) -> Result<Vec<Output>, LedgerError> {
        let _guard = self.inner.read().expect("utxo lock poisoned");
        let mut outputs = Vec::new();
        for (key, _) in self.storage.kv().iter_namespace(UNSPENT_NS)? {
            let bytes = self
                .storage
                .kv()
                .get(OUTPUTS_NS, &key)?
                .ok_or(StoreError::Corruption("unspent entry without output".into()))?;
            outputs.push(
                bincode::deserialize(&bytes)
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?,
            );
        }
        Ok(outputs)
    }
}
