//! Transactions, outputs and allotments.
//!
//! A transaction consumes outputs by reference, produces new output bodies,
//! and may allot mana to accounts. The ledger wraps produced bodies into
//! [`Output`] records once the producing transaction is booked.

use crate::ids::{AccountId, BlockId, CommitmentId, OutputId, TransactionId};
use crate::keys::PublicKey;
use crate::slot::{EpochIndex, SlotIndex};
use crate::time::Timestamp;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

/// Staking values carried by an account output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingFeature {
    pub staked_amount: u64,
    pub end_epoch: EpochIndex,
    pub fixed_cost: u64,
}

/// Account-related features of an output: the account it represents, its
/// block-issuer keys and optional staking values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFeatures {
    pub account_id: AccountId,
    pub issuer_keys: Vec<PublicKey>,
    pub staking: Option<StakingFeature>,
}

/// The content of an output, independent of where it was booked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBody {
    /// Base token amount held by the output.
    pub amount: u64,
    /// Present when the output represents an account.
    pub account: Option<AccountFeatures>,
}

impl OutputBody {
    /// A plain value output.
    pub fn basic(amount: u64) -> Self {
        Self {
            amount,
            account: None,
        }
    }
}

/// An output as known to the UTXO ledger: the body plus booking metadata.
/// Content-addressed by `output_id` and immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub output_id: OutputId,
    /// The earliest included attachment of the producing transaction.
    pub block_id_booked_in: BlockId,
    /// The slot the producing transaction was committed in.
    pub slot_booked: SlotIndex,
    /// The slot derived from the transaction's creation time.
    pub slot_created: SlotIndex,
    pub body: OutputBody,
}

impl Output {
    /// Deterministic hash of the output, used as the state-tree leaf value.
    pub fn state_hash(&self) -> [u8; 32] {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.output_id.to_bytes());
        hasher.update(
            bincode::serialize(&self.body).expect("output body serialization should not fail"),
        );
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

/// A mana allotment to an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allotment {
    pub account_id: AccountId,
    pub mana: u64,
}

/// A value transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub inputs: Vec<OutputId>,
    pub outputs: Vec<OutputBody>,
    pub allotments: Vec<Allotment>,
    pub creation_time: Timestamp,
    /// The commitment the transaction was created against.
    pub commitment_ref: CommitmentId,
}

impl Transaction {
    /// Compute the content hash over all fields except `id` itself.
    pub fn compute_id(&self) -> TransactionId {
        let mut hasher = Blake2b::<U32>::new();
        for input in &self.inputs {
            hasher.update(input.to_bytes());
        }
        hasher.update(
            bincode::serialize(&self.outputs).expect("output serialization should not fail"),
        );
        hasher.update(
            bincode::serialize(&self.allotments).expect("allotment serialization should not fail"),
        );
        hasher.update(self.creation_time.as_secs().to_le_bytes());
        hasher.update(self.commitment_ref.as_bytes());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        TransactionId::new(out)
    }

    /// The IDs of the outputs this transaction produces.
    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        (0..self.outputs.len()).map(|index| OutputId::new(self.id, index as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        let mut tx = Transaction {
            id: TransactionId::ZERO,
            inputs: vec![OutputId::new(TransactionId::new([1u8; 32]), 0)],
            outputs: vec![OutputBody::basic(100), OutputBody::basic(50)],
            allotments: vec![],
            creation_time: Timestamp::new(42),
            commitment_ref: CommitmentId::ZERO,
        };
        tx.id = tx.compute_id();
        tx
    }

    #[test]
    fn id_is_deterministic() {
        assert_eq!(sample_tx().id, sample_tx().id);
    }

    #[test]
    fn id_depends_on_inputs() {
        let a = sample_tx();
        let mut b = sample_tx();
        b.inputs.push(OutputId::new(TransactionId::new([9u8; 32]), 1));
        assert_ne!(a.id, b.compute_id());
    }

    #[test]
    fn output_ids_are_indexed() {
        let tx = sample_tx();
        let ids: Vec<_> = tx.output_ids().collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], OutputId::new(tx.id, 0));
        assert_eq!(ids[1], OutputId::new(tx.id, 1));
    }

    #[test]
    fn output_state_hash_tracks_body() {
        let tx = sample_tx();
        let mut output = Output {
            output_id: OutputId::new(tx.id, 0),
            block_id_booked_in: BlockId::ZERO,
            slot_booked: SlotIndex::new(1),
            slot_created: SlotIndex::new(1),
            body: OutputBody::basic(100),
        };
        let before = output.state_hash();
        output.body.amount = 101;
        assert_ne!(before, output.state_hash());
    }
}
