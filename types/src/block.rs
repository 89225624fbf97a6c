//! Blocks of the DAG.
//!
//! A block references up to three kinds of parents (strong, weak,
//! shallow-like), carries an optional payload and the slot commitment its
//! issuer had observed at issuing time. Blocks are immutable once parsed;
//! all mutable per-block state lives in the engine's block cache.

use crate::ids::{AccountId, BlockId, CommitmentId};
use crate::slot::SlotIndex;
use crate::time::Timestamp;
use crate::transaction::Transaction;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

/// The payload carried by a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// A value transaction, booked through the mempool.
    Transaction(Transaction),
    /// Arbitrary tagged data; ignored by the ledger.
    TaggedData(Vec<u8>),
}

/// An immutable block of the DAG.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Content hash of the block.
    pub id: BlockId,
    /// The account that issued (and signed) the block.
    pub issuer_id: AccountId,
    /// When the block was issued.
    pub issuing_time: Timestamp,
    /// The slot containing `issuing_time`.
    pub slot: SlotIndex,
    /// Parents whose entire history the block endorses.
    pub strong_parents: Vec<BlockId>,
    /// Parents whose payload (but not history) the block references.
    pub weak_parents: Vec<BlockId>,
    /// Parents whose payload the block endorses while disputing their
    /// strong-parent history.
    pub shallow_like_parents: Vec<BlockId>,
    /// Optional payload.
    pub payload: Option<Payload>,
    /// The slot commitment the issuer had observed.
    pub slot_commitment_ref: CommitmentId,
    /// The slot of the referenced commitment.
    pub slot_commitment_slot: SlotIndex,
}

impl Block {
    /// Compute the content hash over all fields except `id` itself.
    pub fn compute_id(&self) -> BlockId {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.issuer_id.as_bytes());
        hasher.update(self.issuing_time.as_secs().to_le_bytes());
        for parent in &self.strong_parents {
            hasher.update(parent.as_bytes());
        }
        hasher.update([0u8]);
        for parent in &self.weak_parents {
            hasher.update(parent.as_bytes());
        }
        hasher.update([1u8]);
        for parent in &self.shallow_like_parents {
            hasher.update(parent.as_bytes());
        }
        hasher.update([2u8]);
        match &self.payload {
            Some(Payload::Transaction(tx)) => hasher.update(tx.id.as_bytes()),
            Some(Payload::TaggedData(data)) => hasher.update(data),
            None => {}
        }
        hasher.update(self.slot_commitment_ref.as_bytes());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        BlockId::new(out)
    }

    /// The transaction payload, if the block carries one.
    pub fn transaction(&self) -> Option<&Transaction> {
        match &self.payload {
            Some(Payload::Transaction(tx)) => Some(tx),
            _ => None,
        }
    }

    /// All parents of the block, regardless of reference kind. A block is
    /// solid once every one of these is known.
    pub fn all_parents(&self) -> impl Iterator<Item = &BlockId> {
        self.strong_parents
            .iter()
            .chain(self.weak_parents.iter())
            .chain(self.shallow_like_parents.iter())
    }
}
