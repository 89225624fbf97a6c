//! Slot commitments and their root set.
//!
//! A commitment seals one slot: it chains to its predecessor by ID, carries
//! the identifier of the slot's roots and the chain's cumulative committee
//! weight. The wire form is fixed-width so that commitment IDs are identical
//! across implementations.

use crate::error::TypeError;
use crate::ids::CommitmentId;
use crate::slot::SlotIndex;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

/// The Merkle roots sealed into a commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Roots {
    pub accepted_blocks_root: [u8; 32],
    pub mutations_root: [u8; 32],
    pub attestations_root: [u8; 32],
    pub state_root: [u8; 32],
    pub accounts_root: [u8; 32],
}

impl Roots {
    /// Identifier of the root set: Blake2b-256 over the concatenated roots.
    pub fn id(&self) -> [u8; 32] {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.accepted_blocks_root);
        hasher.update(self.mutations_root);
        hasher.update(self.attestations_root);
        hasher.update(self.state_root);
        hasher.update(self.accounts_root);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

/// A slot commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub slot: SlotIndex,
    pub prev_id: CommitmentId,
    pub roots_id: [u8; 32],
    pub cumulative_weight: u64,
}

impl Commitment {
    /// Wire width: `slot:u64 | prev_id:32B | roots_id:32B | cumulative_weight:u64`.
    pub const WIRE_LENGTH: usize = 8 + 32 + 32 + 8;

    /// The genesis commitment: slot 0, all-zero links, zero weight.
    pub fn genesis() -> Self {
        Self {
            slot: SlotIndex::GENESIS,
            prev_id: CommitmentId::ZERO,
            roots_id: [0u8; 32],
            cumulative_weight: 0,
        }
    }

    /// Canonical wire form.
    pub fn to_wire_bytes(&self) -> [u8; Self::WIRE_LENGTH] {
        let mut bytes = [0u8; Self::WIRE_LENGTH];
        bytes[0..8].copy_from_slice(&self.slot.as_u64().to_le_bytes());
        bytes[8..40].copy_from_slice(self.prev_id.as_bytes());
        bytes[40..72].copy_from_slice(&self.roots_id);
        bytes[72..80].copy_from_slice(&self.cumulative_weight.to_le_bytes());
        bytes
    }

    /// Parse the canonical wire form.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() < Self::WIRE_LENGTH {
            return Err(TypeError::Truncated {
                needed: Self::WIRE_LENGTH,
                available: bytes.len(),
            });
        }
        if bytes.len() > Self::WIRE_LENGTH {
            return Err(TypeError::TrailingBytes);
        }

        let slot = u64::from_le_bytes(bytes[0..8].try_into().expect("length checked"));
        let mut prev = [0u8; 32];
        prev.copy_from_slice(&bytes[8..40]);
        let mut roots = [0u8; 32];
        roots.copy_from_slice(&bytes[40..72]);
        let weight = u64::from_le_bytes(bytes[72..80].try_into().expect("length checked"));

        Ok(Self {
            slot: SlotIndex::new(slot),
            prev_id: CommitmentId::new(prev),
            roots_id: roots,
            cumulative_weight: weight,
        })
    }

    /// The commitment's identifier: Blake2b-256 of the wire form.
    pub fn id(&self) -> CommitmentId {
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(self.to_wire_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        CommitmentId::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_commitment() -> Commitment {
        Commitment {
            slot: SlotIndex::new(3),
            prev_id: CommitmentId::new([1u8; 32]),
            roots_id: [2u8; 32],
            cumulative_weight: 77,
        }
    }

    #[test]
    fn wire_roundtrip() {
        let c = sample_commitment();
        let restored = Commitment::from_wire_bytes(&c.to_wire_bytes()).unwrap();
        assert_eq!(c, restored);
        assert_eq!(c.id(), restored.id());
    }

    #[test]
    fn truncated_wire_rejected() {
        let c = sample_commitment();
        let bytes = c.to_wire_bytes();
        assert!(matches!(
            Commitment::from_wire_bytes(&bytes[..40]),
            Err(TypeError::Truncated { .. })
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let c = sample_commitment();
        let mut bytes = c.to_wire_bytes().to_vec();
        bytes.push(0);
        assert!(matches!(
            Commitment::from_wire_bytes(&bytes),
            Err(TypeError::TrailingBytes)
        ));
    }

    #[test]
    fn id_changes_with_weight() {
        let a = sample_commitment();
        let mut b = sample_commitment();
        b.cumulative_weight += 1;
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn roots_id_depends_on_every_root() {
        let base = Roots::default();
        let mut changed = base;
        changed.accounts_root = [9u8; 32];
        assert_ne!(base.id(), changed.id());
    }
}
