//! Per-slot state diffs.
//!
//! The diff of a slot is the set of accepted transactions whose earliest
//! included attachment falls in that slot. Intra-slot chains are compacted:
//! an output created and consumed within the same slot appears in neither
//! `created_states` nor `destroyed_states`.

use strata_ledger::tree::merkle_root;
use strata_types::{BlockId, OutputBody, OutputId, SlotIndex, Timestamp, TransactionId};

/// An output the slot adds to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedState {
    pub output_id: OutputId,
    pub body: OutputBody,
    /// The earliest included attachment of the producing transaction.
    pub block_id_booked_in: BlockId,
    pub creation_time: Timestamp,
}

/// An output the slot removes from the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestroyedState {
    pub output_id: OutputId,
    pub spender: TransactionId,
}

/// The net state changes of one slot.
#[derive(Clone, Debug, Default)]
pub struct StateDiff {
    pub slot: SlotIndex,
    pub created_states: Vec<CreatedState>,
    pub destroyed_states: Vec<DestroyedState>,
    /// Accepted transactions of the slot, in ID order.
    pub executed_transactions: Vec<TransactionId>,
}

impl StateDiff {
    pub fn new(slot: SlotIndex) -> Self {
        Self {
            slot,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.executed_transactions.is_empty()
    }

    /// Merkle accumulator over the executed transactions.
    pub fn mutations_root(&self) -> [u8; 32] {
        let leaves: Vec<[u8; 32]> = self
            .executed_transactions
            .iter()
            .map(|id| *id.as_bytes())
            .collect();
        merkle_root(&leaves)
    }
}
